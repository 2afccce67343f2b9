//! Result archival tests.

use simdock_agent::archive;

#[tokio::test]
async fn matching_files_picks_configs_csvs_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["run.json5", "finrep.csv", "sim.log", "notes.txt", "core.bin"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    // Subdirectories are not descended into.
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("deep.csv"), b"x").unwrap();

    let files = archive::matching_files(dir.path()).await.unwrap();
    assert_eq!(files, vec!["finrep.csv", "run.json5", "sim.log"]);
}

#[tokio::test]
async fn build_archive_bundles_matching_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("run.json5"), b"{ Generations: 5 }").unwrap();
    std::fs::write(dir.path().join("finrep.csv"), b"gen,score\n1,0.5\n").unwrap();
    std::fs::write(dir.path().join("sim.log"), b"done\n").unwrap();
    std::fs::write(dir.path().join("scratch.tmp"), b"junk").unwrap();

    let tarball = archive::build_results_archive(dir.path()).await.unwrap();
    assert!(tarball.ends_with("results.tar.gz"));
    assert!(tarball.is_file());

    let listing = std::process::Command::new("tar")
        .args(["tzf", "results.tar.gz"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert!(listing.status.success());
    let names = String::from_utf8_lossy(&listing.stdout);
    let mut names: Vec<&str> = names.lines().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["finrep.csv", "run.json5", "sim.log"]);
}

#[tokio::test]
async fn rebuilding_excludes_the_previous_archive() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("finrep.csv"), b"gen,score\n").unwrap();

    archive::build_results_archive(dir.path()).await.unwrap();
    // Second build must not try to tar the archive into itself.
    archive::build_results_archive(dir.path()).await.unwrap();

    let listing = std::process::Command::new("tar")
        .args(["tzf", "results.tar.gz"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    let names = String::from_utf8_lossy(&listing.stdout);
    assert_eq!(names.trim(), "finrep.csv");
}

#[tokio::test]
async fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(archive::build_results_archive(dir.path()).await.is_err());
}
