#![no_main]

use huffpack::compress::{Cfg, Compressor};
use huffpack::decompress::{DecompressCfg, Decompressor};
use huffpack::types::FileTask;
use libfuzzer_sys::fuzz_target;
use std::fs;
use tempfile::TempDir;

// First byte picks the worker count, the rest is split into files on 0xff.
fuzz_target!(|data: &[u8]| {
    let _ = env_logger::builder().is_test(true).try_init();
    let Some((&head, body)) = data.split_first() else {
        return;
    };
    if body.is_empty() {
        return;
    }

    let src = TempDir::new().unwrap();
    let files: Vec<&[u8]> = body.split(|&b| b == 0xff).take(32).collect();
    let tasks: Vec<FileTask> = files
        .iter()
        .enumerate()
        .map(|(i, content)| {
            let path = src.path().join(format!("f{}", i));
            fs::write(&path, content).unwrap();
            FileTask::new(path, format!("f{}", i), content.len() as u64, i)
        })
        .collect();

    let mut cfg = Cfg::with_workers((head % 8) as usize + 1);
    cfg.no_fsync = true;
    let archive = src.path().join("out.huff");
    match Compressor::new(cfg, &archive).compress_files(tasks) {
        Ok(_) => {}
        Err(huffpack::Error::EmptyAlphabet) => return,
        Err(e) => panic!("compress failed: {}", e),
    }

    let dec = Decompressor::open(&archive, DecompressCfg::default()).unwrap();
    assert_eq!(dec.entries().len(), files.len());
    for (i, content) in files.iter().enumerate() {
        assert_eq!(&dec.read_entry(i).unwrap(), content);
    }
});
