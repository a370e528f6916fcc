// Benchmark the hashing hot loop: the `Hasher` component of the core
// (§4.1), in isolation from directory walking or surefile I/O.
//
// To compute hashing speed, take 1 over the benchmark time in seconds
// and multiply by the number of bytes processed per iteration.

#![feature(test)]

extern crate test;

use asure::hashes::hash_path;
use openssl::hash::{Hasher, MessageDigest};
use std::fs::File;
use std::io::Write;
use tempdir::TempDir;
use test::Bencher;

#[bench]
fn hash_path_16mb(b: &mut Bencher) {
    let tmp = TempDir::new("asure-bench").unwrap();
    let path = tmp.path().join("large");
    let mut fd = File::create(&path).unwrap();
    let buf = vec![0u8; 1024 * 1024];
    for _ in 0..16 {
        fd.write_all(&buf).unwrap();
    }
    drop(fd);

    b.iter(|| hash_path(&path).unwrap());
}

#[bench]
fn openssl_sha1_16mb(b: &mut Bencher) {
    let buf = vec![0u8; 1024 * 1024 * 16];

    b.iter(|| {
        let mut h = Hasher::new(MessageDigest::sha1()).unwrap();
        h.write_all(&buf).unwrap();
        h.finish().unwrap();
    })
}
