#![cfg(feature = "fuzzing")]

use std::fs;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;
use tunecast_core::{decode_record, ItemCatalog, LineStore, Separators};

const ALPHABET: &[u8] = b"0123456789:|.-+eE aX\n\r\t";

#[test]
fn malformed_lines_do_not_panic_decoder() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..5_000 {
        let len = rng.gen_range(0..256usize);
        let bytes: Vec<u8> = (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
            .collect();
        let line = String::from_utf8_lossy(&bytes);

        if let Ok(record) = decode_record(&line, Separators::default()) {
            let _ = record.float_fields();
            let _ = record.int_key();
        }
    }
}

#[test]
fn malformed_files_do_not_panic_loaders() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("noise.txt");
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let len = rng.gen_range(0..4096usize);
        let mut data = vec![0u8; len];
        if rng.gen_bool(0.5) {
            rng.fill(data.as_mut_slice());
        } else {
            for byte in data.iter_mut() {
                *byte = ALPHABET[rng.gen_range(0..ALPHABET.len())];
            }
        }
        fs::write(&path, &data).unwrap();

        let _ = ItemCatalog::load(&path, Separators::default());
        if let Ok(store) = LineStore::open(&path, Separators::default()) {
            let keys: Vec<String> = store.offsets().map(|(key, _)| key.to_string()).collect();
            for key in keys {
                let _ = store.lookup(&key);
            }
        }
    }
}
