//! Shared fixtures for the import integration tests

#![allow(dead_code)]

use ibvl_import::config::RunOptions;
use ibvl_import::model::{ColumnDef, ColumnType, TableSchema};
use ibvl_import::sink::MemorySink;
use std::path::Path;

fn table(name: &str, columns: &[(&str, ColumnType, bool)]) -> TableSchema {
    TableSchema::new(
        name,
        columns
            .iter()
            .map(|(n, t, nullable)| ColumnDef::new(*n, t.clone(), *nullable))
            .collect(),
    )
}

/// In-memory catalog with the tables and constraints the tests use
pub fn catalog_sink() -> MemorySink {
    use ColumnType::*;

    MemorySink::new()
        .with_table(table(
            "genes",
            &[("id", Integer, false), ("short_name", Text, false)],
        ))
        .with_unique("genes", "short_name")
        .with_table(table(
            "transcripts",
            &[
                ("id", Integer, false),
                ("transcript_id", Text, false),
                ("gene", Integer, false),
                ("tsl", Text, true),
            ],
        ))
        .with_unique("transcripts", "transcript_id")
        .with_reference("transcripts", "gene", "genes")
        .with_table(table(
            "variants",
            &[
                ("id", Integer, false),
                ("variant_id", Text, false),
                ("var_type", Text, false),
            ],
        ))
        .with_unique("variants", "variant_id")
        .with_table(table(
            "variants_transcripts",
            &[
                ("id", Integer, false),
                ("transcript", Integer, false),
                ("variant", Integer, false),
                ("hgvsc", Text, true),
            ],
        ))
        .with_reference("variants_transcripts", "transcript", "transcripts")
        .with_reference("variants_transcripts", "variant", "variants")
        .with_table(table(
            "variants_annotations",
            &[
                ("id", Integer, false),
                ("variant_transcript", Integer, false),
                ("hgvsp", Text, true),
                ("polyphen", Float, true),
            ],
        ))
        .with_table(table(
            "sv_consequences",
            &[
                ("id", Integer, false),
                ("gene", Integer, true),
                ("variant", Integer, false),
                ("consequence", Text, true),
            ],
        ))
        .with_reference("sv_consequences", "gene", "genes")
        .with_reference("sv_consequences", "variant", "variants")
        .with_table(table(
            "snvs",
            &[
                ("id", Integer, false),
                ("variant", Integer, false),
                ("dbsnp_id", Text, true),
                ("pos", Integer, false),
                ("af", Float, true),
            ],
        ))
        .with_reference("snvs", "variant", "variants")
        .with_table(table(
            "str",
            &[
                ("id", Integer, false),
                ("variant", Integer, false),
                ("repeat_unit", Text, true),
            ],
        ))
        .with_reference("str", "variant", "variants")
}

/// Write a source file under `<root>/<entity>/<file>`
pub fn write_tsv(root: &Path, entity: &str, file: &str, contents: &str) {
    let dir = root.join(entity);
    std::fs::create_dir_all(&dir).expect("create entity dir");
    std::fs::write(dir.join(file), contents).expect("write source file");
}

pub fn options(root: &Path, chunk_size: usize) -> RunOptions {
    RunOptions::new(root, chunk_size)
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    serde_json::from_slice(&std::fs::read(path).expect("read checkpoint")).expect("parse checkpoint")
}
