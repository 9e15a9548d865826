use huffpack::compress::{Cfg, Compressor};
use huffpack::decompress::{DecompressCfg, Decompressor};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn test_cfg(workers: usize) -> Cfg {
    let mut cfg = Cfg::with_workers(workers);
    cfg.log_prefix = "roundtrip".to_string();
    cfg.no_fsync = true;
    cfg
}

fn populate(dir: &Path, files: &[(String, Vec<u8>)]) {
    for (name, data) in files {
        fs::write(dir.join(name), data).unwrap();
    }
}

// Compresses `files`, extracts them again, and returns the output directory.
fn round_trip(
    files: &[(String, Vec<u8>)],
    workers: usize,
    max_workers: Option<usize>,
) -> (TempDir, TempDir) {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    populate(src.path(), files);

    let archive = work.path().join("archive.huff");
    let summary = Compressor::new(test_cfg(workers), &archive)
        .compress_directory(src.path())
        .unwrap();
    assert_eq!(summary.files_written, files.len());

    let cfg = DecompressCfg {
        max_workers,
        log_prefix: "roundtrip".to_string(),
        no_fsync: true,
    };
    let out = work.path().join("restored");
    let extracted = Decompressor::open(&archive, cfg).unwrap().extract_all(&out).unwrap();
    assert!(extracted.is_complete(), "{:?}", extracted.failures);
    assert_eq!(extracted.files_restored, files.len());
    (src, work)
}

fn assert_restored(files: &[(String, Vec<u8>)], work: &TempDir) {
    let out = work.path().join("restored");
    assert_eq!(fs::read_dir(&out).unwrap().count(), files.len());
    for (name, data) in files {
        let restored = fs::read(out.join(name)).unwrap();
        assert_eq!(
            crc32fast::hash(&restored),
            crc32fast::hash(data),
            "checksum mismatch for {}",
            name
        );
        assert_eq!(&restored, data);
    }
}

#[test]
fn test_edge_case_files() {
    let _ = env_logger::builder().is_test(true).try_init();
    let files = vec![
        ("empty".to_string(), Vec::new()),
        ("one_byte".to_string(), vec![0x7f]),
        ("all_x".to_string(), vec![b'x'; 100]),
        ("binary".to_string(), (0..=255u8).collect()),
    ];
    let (_src, work) = round_trip(&files, 3, None);
    assert_restored(&files, &work);
}

#[test]
fn test_single_symbol_archive() {
    let _ = env_logger::builder().is_test(true).try_init();
    let files = vec![("x100".to_string(), vec![b'x'; 100])];
    let (_src, work) = round_trip(&files, 1, Some(1));
    assert_restored(&files, &work);

    let archive = work.path().join("archive.huff");
    let dec = Decompressor::open(archive, DecompressCfg::default()).unwrap();
    let entry = &dec.entries()[0];
    assert!(entry.data_len > 0);
    // One bit per byte
    assert_eq!(entry.data_len, 13);
}

#[test]
fn test_many_random_files_with_bounded_extraction() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let files: Vec<(String, Vec<u8>)> = (0..40)
        .map(|i| {
            let len = rng.gen_range(0..4096);
            // Skewed alphabet so the tree is not flat
            let data = (0..len)
                .map(|_| (rng.gen::<u8>() % 17) * (rng.gen::<u8>() % 3))
                .collect();
            (format!("rand_{:03}.bin", i), data)
        })
        .collect();

    let (_src, work) = round_trip(&files, 4, Some(3));
    assert_restored(&files, &work);
}

#[cfg(unix)]
#[test]
fn test_backslash_names_survive() {
    let _ = env_logger::builder().is_test(true).try_init();
    let files = vec![
        ("a\\b.txt".to_string(), b"back slashed".to_vec()),
        ("plain".to_string(), b"plain file".to_vec()),
        ("..\\up".to_string(), b"still one component".to_vec()),
    ];
    let (_src, work) = round_trip(&files, 2, Some(2));
    assert_restored(&files, &work);
}

#[test]
fn test_extract_creates_nested_output_dir() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::write(src.path().join("hello"), b"hello").unwrap();
    let archive = work.path().join("a.huff");
    Compressor::new(test_cfg(1), &archive)
        .compress_directory(src.path())
        .unwrap();

    let out = work.path().join("deep").join("er");
    let summary = Decompressor::open(&archive, DecompressCfg::default())
        .unwrap()
        .extract_all(&out)
        .unwrap();
    assert_eq!(summary.files_restored, 1);
    assert_eq!(fs::read(out.join("hello")).unwrap(), b"hello");
}

fn file_set_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_round_trip_arbitrary_files(contents in file_set_strategy(), workers in 1usize..5) {
        let _ = env_logger::builder().is_test(true).try_init();
        prop_assume!(contents.iter().any(|c| !c.is_empty()));

        let files: Vec<(String, Vec<u8>)> = contents
            .into_iter()
            .enumerate()
            .map(|(i, c)| (format!("file{:02}", i), c))
            .collect();
        let (_src, work) = round_trip(&files, workers, None);
        assert_restored(&files, &work);
    }
}
