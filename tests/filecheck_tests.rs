//! FileCheck-style tests for TIR files
//!
//! Each file under `tests/filetest` carries its own RUN and CHECK lines; the
//! runner executes the barrier phase per RUN line and matches the output.

use std::fs;
use std::path::{Path, PathBuf};
use store_barrier::test_ir::{TestRunner, TestSpec};

fn filetest_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetest")
}

/// Test helper that runs a TIR file through FileCheck validation
fn run_filecheck_test(tir_file: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = filetest_dir().join(tir_file);
    let contents = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));

    let spec = TestSpec::parse(&contents)
        .unwrap_or_else(|e| panic!("Failed to parse test spec from {}: {}", tir_file, e));

    TestRunner::new()
        .run_test(&spec)
        .unwrap_or_else(|e| panic!("Test {} failed: {}", tir_file, e));
}

#[test]
fn test_end_to_end_filecheck() {
    run_filecheck_test("end_to_end.tir");
}

/// Block order, liveness and converged boundary sets of a diamond
#[test]
fn test_diamond_analysis_filecheck() {
    run_filecheck_test("diamond.tir");
}

#[test]
fn test_stack_escape_filecheck() {
    run_filecheck_test("stack_escape.tir");
}

#[test]
fn test_errors_filecheck() {
    run_filecheck_test("errors.tir");
}

#[test]
fn test_global_elision_filecheck() {
    run_filecheck_test("global_elision.tir");
}

/// Every file in the directory has a RUN line and passes.
#[test]
fn test_all_filetests() {
    let mut entries: Vec<PathBuf> = fs::read_dir(filetest_dir())
        .expect("filetest directory")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "tir"))
        .collect();
    entries.sort();
    assert!(entries.len() >= 5);

    let mut failures = Vec::new();
    for path in &entries {
        let contents = fs::read_to_string(path).expect("readable test file");
        let result = TestSpec::parse(&contents).and_then(|spec| {
            assert!(!spec.run_directives.is_empty(), "{} has no RUN line", path.display());
            TestRunner::new().run_test(&spec)
        });
        if let Err(e) = result {
            failures.push(format!("{}: {}", path.display(), e));
        }
    }
    assert!(failures.is_empty(), "failing filetests:\n{}", failures.join("\n"));
}

/// A CHECK that does not hold is reported, not silently accepted.
#[test]
fn test_mismatch_is_reported() {
    let spec = TestSpec::parse(
        "; RUN: barrier-opt --print-ir %s\n\
         ; CHECK: fenced_store_barrier\n\
         f(%o) {\nentry:\n    %a = new_object\n    put_by_offset %a, %a, %o\n    return\n}\n",
    )
    .unwrap();
    let err = TestRunner::new().run_test(&spec).unwrap_err();
    assert!(err.to_string().contains("fenced_store_barrier"));
}
