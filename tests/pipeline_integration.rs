use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use assert_fs::{TempDir, prelude::*};
use sumstats_lift::liftover::TieBreak;
use sumstats_lift::{
    ChainMap, ChainSet, FileOutcome, FileReport, GenomeBuild, Pipeline, PipelineConfig,
};

// hg38 chr1:[10000, 20000) <-> hg19 chr1:[5000, 15000)
// hg38 chr6:[30000000, 30100000) <-> hg19 chr6:[29970000, 30070000), inside the MHC
// hg38 chr6:[40000000, 40100000) <-> hg19 chr6:[39970000, 40070000)
const HG38_TO_HG19: &str = "\
chain 1000 chr1 1000000 + 10000 20000 chr1 1000000 + 5000 15000 1
10000

chain 1000 chr6 200000000 + 30000000 30100000 chr6 200000000 + 29970000 30070000 2
100000

chain 1000 chr6 200000000 + 40000000 40100000 chr6 200000000 + 39970000 40070000 3
100000
";

const HG19_TO_HG38: &str = "\
chain 1000 chr1 1000000 + 5000 15000 chr1 1000000 + 10000 20000 1
10000

chain 1000 chr6 200000000 + 29970000 30070000 chr6 200000000 + 30000000 30100000 2
100000

chain 1000 chr6 200000000 + 39970000 40070000 chr6 200000000 + 40000000 40100000 3
100000
";

const HEADER: &str = "SNP chr pos effect_allele other_allele eaf beta se pval samplesize";

fn chains() -> Arc<ChainSet> {
    Arc::new(ChainSet::new(
        ChainMap::from_reader(HG19_TO_HG38.as_bytes()).unwrap(),
        ChainMap::from_reader(HG38_TO_HG19.as_bytes()).unwrap(),
    ))
}

fn pipeline(input: &Path, output: &Path, build: GenomeBuild) -> Pipeline {
    Pipeline::new(
        PipelineConfig::new(input.to_path_buf(), output.to_path_buf(), build),
        chains(),
    )
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

fn completed(outcome: &FileOutcome) -> &FileReport {
    match outcome {
        FileOutcome::Completed(report) => report,
        other => panic!("expected a completed file, got {other:?}"),
    }
}

fn hg38_table() -> String {
    [
        HEADER,
        "rs1 1 10001 A G 0.3 0.1 0.01 1e-5 1000",
        "rs2 chr1 12000.0 C T 0.004 0.2 0.02 0.5 1000",
        "rs3 6 30000001 G A 0.2 0.1 0.01 0.05 1000",
        "rs4 6 40000500 T C 0.45 -0.3 0.05 0.01 1000",
        "rs5 1 500000 A C 0.3 0.1 0.01 0.05 1000",
        "rs6 1 123abc A C 0.3 0.1 0.01 0.05 1000",
        "rs7 2 100 A C 0.3 0.1 0.01 0.05 1000",
        "rs8 1 15000 A C 0.996 0.1 0.01 0.05 1000 extra",
        "rs9 1 15001 A C 0.996 0.1 0.01 0.05 1000",
    ]
    .join("\n")
}

#[test]
fn hg38_input_produces_matching_views() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("in");
    input.create_dir_all().unwrap();
    input.child("trait.txt").write_str(&hg38_table()).unwrap();
    let output = temp.child("out");

    let summary = pipeline(input.path(), output.path(), GenomeBuild::Hg38)
        .run()
        .unwrap();
    assert_eq!(summary.files.len(), 1);
    let report = completed(&summary.files[0].outcome);
    assert_eq!(report.raw_rows, 8);
    assert_eq!(report.malformed_lines, 1);
    assert_eq!(report.cleaned_rows, 7);
    assert_eq!(report.dropped_rows, 1);
    assert_eq!(report.reference_unmapped, 2);
    assert_eq!(report.region_excluded, 1);
    assert_eq!(report.rare_excluded, 2);
    assert_eq!(report.reference_rows, 2);
    assert_eq!(report.alternate_rows, 2);
    assert_eq!(report.alternate_unmapped, 0);
    assert!(report.upload_written);

    let hg19 = read_lines(&output.path().join("1.hg19/trait.txt"));
    assert_eq!(hg19[0], HEADER.replace(' ', "\t"));
    assert_eq!(hg19[1], "rs1\t1\t5001\tA\tG\t0.3\t0.1\t0.01\t1e-5\t1000");
    assert_eq!(hg19[2], "rs4\t6\t39970500\tT\tC\t0.45\t-0.3\t0.05\t0.01\t1000");
    assert_eq!(hg19.len(), 3);

    let hg38 = read_lines(&output.path().join("2.hg38/trait.txt"));
    assert_eq!(hg38[1], "rs1\t1\t10001\tA\tG\t0.3\t0.1\t0.01\t1e-5\t1000");
    assert_eq!(hg38[2], "rs4\t6\t40000500\tT\tC\t0.45\t-0.3\t0.05\t0.01\t1000");
    assert_eq!(hg38.len(), 3);

    let mut upload = String::new();
    flate2::read::MultiGzDecoder::new(
        fs::File::open(output.path().join("3.FUMA/trait.txt.gz")).unwrap(),
    )
    .read_to_string(&mut upload)
    .unwrap();
    let upload: Vec<&str> = upload.lines().collect();
    assert_eq!(upload[0], "SNP\tCHR\tBP\tA1\tA2\tP\tBETA\tSE\tN");
    assert_eq!(upload[1], "rs1\t1\t5001\tA\tG\t1e-5\t0.1\t0.01\t1000");
    assert_eq!(upload.len(), 3);
}

#[test]
fn hg19_input_keeps_rows_missing_from_hg38() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("in");
    input.create_dir_all().unwrap();
    input
        .child("trait.txt")
        .write_str(
            &[
                HEADER,
                "rs1 1 5001 A G 0.3 0.1 0.01 0.05 1000",
                "rs2 1 20000 A G 0.3 0.1 0.01 0.05 1000",
                "rs3 6 29970001 A G 0.3 0.1 0.01 0.05 1000",
            ]
            .join("\n"),
        )
        .unwrap();
    let output = temp.child("out");

    let summary = pipeline(input.path(), output.path(), GenomeBuild::Hg19)
        .run()
        .unwrap();
    let report = completed(&summary.files[0].outcome);
    assert_eq!(report.reference_unmapped, 0);
    assert_eq!(report.region_excluded, 1);
    assert_eq!(report.reference_rows, 2);
    assert_eq!(report.alternate_unmapped, 1);
    assert_eq!(report.alternate_rows, 1);

    let hg19 = read_lines(&output.path().join("1.hg19/trait.txt"));
    assert_eq!(hg19.len(), 3);
    assert!(hg19[2].starts_with("rs2\t1\t20000\t"));

    let hg38 = read_lines(&output.path().join("2.hg38/trait.txt"));
    assert_eq!(hg38.len(), 2);
    assert!(hg38[1].starts_with("rs1\t1\t10001\t"));
}

#[test]
fn rerun_skips_finished_files_and_redoes_unfinished_ones() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("in");
    input.create_dir_all().unwrap();
    input.child("a.txt").write_str(&hg38_table()).unwrap();
    input.child("b.txt").write_str(&hg38_table()).unwrap();
    let output = temp.child("out");

    let first = pipeline(input.path(), output.path(), GenomeBuild::Hg38)
        .run()
        .unwrap();
    assert_eq!(first.completed(), 2);
    let before = fs::read(output.path().join("1.hg19/a.txt")).unwrap();

    // b.txt loses its completion marker, as if the run died before writing it.
    fs::remove_file(output.path().join("1.hg19/b.txt")).unwrap();

    let second = pipeline(input.path(), output.path(), GenomeBuild::Hg38)
        .run()
        .unwrap();
    assert_eq!(second.files[0].outcome, FileOutcome::Skipped);
    assert!(matches!(second.files[1].outcome, FileOutcome::Completed(_)));
    assert_eq!(second.skipped(), 1);
    assert_eq!(fs::read(output.path().join("1.hg19/a.txt")).unwrap(), before);
    assert_eq!(
        fs::read(output.path().join("1.hg19/b.txt")).unwrap(),
        before
    );

    let third = pipeline(input.path(), output.path(), GenomeBuild::Hg38)
        .run()
        .unwrap();
    assert_eq!(third.skipped(), 2);
}

#[test]
fn missing_sample_size_skips_only_the_upload() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("in");
    input.create_dir_all().unwrap();
    input
        .child("trait.txt")
        .write_str(
            "SNP chr pos effect_allele other_allele eaf beta se pval\n\
             rs1 1 5001 A G 0.3 0.1 0.01 0.05\n",
        )
        .unwrap();
    let output = temp.child("out");

    let summary = pipeline(input.path(), output.path(), GenomeBuild::Hg19)
        .run()
        .unwrap();
    let report = completed(&summary.files[0].outcome);
    assert!(!report.upload_written);
    assert!(output.path().join("1.hg19/trait.txt").exists());
    assert!(output.path().join("2.hg38/trait.txt").exists());
    assert!(!output.path().join("3.FUMA/trait.txt.gz").exists());
}

#[test]
fn partial_schema_still_processes() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("in");
    input.create_dir_all().unwrap();
    input
        .child("trait.txt")
        .write_str("SNP chr pos eaf\nrs1 1 5001 0.3\nrs2 1 5002 NA\n")
        .unwrap();
    let output = temp.child("out");

    let summary = pipeline(input.path(), output.path(), GenomeBuild::Hg19)
        .run()
        .unwrap();
    let report = completed(&summary.files[0].outcome);
    assert_eq!(report.cleaned_rows, 1);
    assert_eq!(report.dropped_rows, 1);
    assert!(!report.upload_written);
}

#[test]
fn empty_and_headerless_files_are_reported_and_retried() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("in");
    input.create_dir_all().unwrap();
    input.child("blank.txt").touch().unwrap();
    input.child("header.txt").write_str(HEADER).unwrap();
    let output = temp.child("out");

    for _ in 0..2 {
        let summary = pipeline(input.path(), output.path(), GenomeBuild::Hg38)
            .run()
            .unwrap();
        assert!(matches!(
            summary.files[0].outcome,
            FileOutcome::FailedRead { .. }
        ));
        assert_eq!(
            summary.files[1].outcome,
            FileOutcome::FailedEmpty { raw_rows: 0 }
        );
        assert_eq!(summary.failed(), 2);
    }
    assert!(!output.path().join("1.hg19/header.txt").exists());
}

#[test]
fn parallel_run_matches_sequential_run() {
    let temp = TempDir::new().unwrap();
    let input = temp.child("in");
    input.create_dir_all().unwrap();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
        input.child(name).write_str(&hg38_table()).unwrap();
    }

    let sequential = temp.child("seq");
    let summary = pipeline(input.path(), sequential.path(), GenomeBuild::Hg38)
        .run()
        .unwrap();

    let parallel = temp.child("par");
    let mut config = PipelineConfig::new(
        input.path().to_path_buf(),
        parallel.path().to_path_buf(),
        GenomeBuild::Hg38,
    );
    config.threads = 0;
    let parallel_summary = Pipeline::new(config, chains()).run().unwrap();

    assert_eq!(summary.completed(), 4);
    for (a, b) in summary.files.iter().zip(&parallel_summary.files) {
        assert_eq!(a.file, b.file);
        assert_eq!(a.outcome, b.outcome);
    }
    for name in ["a.txt", "d.txt"] {
        assert_eq!(
            fs::read(sequential.path().join("2.hg38").join(name)).unwrap(),
            fs::read(parallel.path().join("2.hg38").join(name)).unwrap()
        );
    }
}

#[test]
fn bad_chain_file_is_fatal() {
    let temp = TempDir::new().unwrap();
    let good = temp.child("good.chain");
    good.write_str(HG19_TO_HG38).unwrap();
    let bad = temp.child("bad.chain");
    bad.write_str("chain 1000 chr1 nope\n").unwrap();

    assert!(ChainSet::load(good.path(), bad.path(), TieBreak::BestScore).is_err());
    assert!(
        ChainSet::load(good.path(), &temp.path().join("absent.chain"), TieBreak::First).is_err()
    );
    assert!(ChainSet::load(good.path(), good.path(), TieBreak::First).is_ok());
}
