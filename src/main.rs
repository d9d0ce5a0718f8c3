fn main() -> anyhow::Result<()> {
    sumstats_lift::cli::run()
}
