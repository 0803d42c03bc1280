//! Entity registry
//!
//! Static import rules for every target table, listed in processing order.
//! Upstream types come first so their key maps exist before anything
//! references them.

use crate::model::{Row, Value};

/// Source-file identifier an entity type is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaturalKey {
    None,
    Column(&'static str),
    /// Several columns joined with `-`
    Composite(&'static [&'static str]),
}

/// Value rewrite applied to a text column before resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Uppercase,
    Replace {
        from: &'static str,
        to: &'static str,
    },
    /// Keep the text before the first occurrence of the separator
    TakeBefore(char),
}

impl Transform {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Transform::Uppercase => value.to_uppercase(),
            Transform::Replace { from, to } => value.replace(from, to),
            Transform::TakeBefore(sep) => value
                .split(*sep)
                .next()
                .unwrap_or(value)
                .to_string(),
        }
    }
}

/// Source column holding a natural key of another entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub target: &'static str,
}

/// FK stored in `column`, resolved from two upstream keys joined with `-`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompoundForeignKey {
    pub column: &'static str,
    pub target: &'static str,
    pub parts: [ForeignKey; 2],
}

/// Allow-listed stub insertion for an unresolved FK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Injection {
    /// FK column on the importing entity that triggers the repair
    pub column: &'static str,
    pub target: &'static str,
    /// Stub column receiving the missing natural key
    pub key_column: &'static str,
    /// Fixed stub columns
    pub fixed: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityType {
    pub name: &'static str,
    pub natural_key: NaturalKey,
    pub foreign_keys: &'static [ForeignKey],
    pub compound_key: Option<CompoundForeignKey>,
    pub transforms: &'static [(&'static str, Transform)],
    pub injections: &'static [Injection],
    pub skip: bool,
}

const VARIANT_FK: ForeignKey = ForeignKey {
    column: "variant",
    target: "variants",
};

const VARIANT_TRANSCRIPT_FK: CompoundForeignKey = CompoundForeignKey {
    column: "variant_transcript",
    target: "variants_transcripts",
    parts: [
        ForeignKey {
            column: "transcript",
            target: "transcripts",
        },
        VARIANT_FK,
    ],
};

const fn variant_stub(fixed: &'static [(&'static str, &'static str)]) -> Injection {
    Injection {
        column: "variant",
        target: "variants",
        key_column: "variant_id",
        fixed,
    }
}

const fn entity(name: &'static str) -> EntityType {
    EntityType {
        name,
        natural_key: NaturalKey::None,
        foreign_keys: &[],
        compound_key: None,
        transforms: &[],
        injections: &[],
        skip: false,
    }
}

const fn variant_child(name: &'static str) -> EntityType {
    EntityType {
        foreign_keys: &[VARIANT_FK],
        ..entity(name)
    }
}

/// Every entity type in processing order
pub static ENTITY_TYPES: &[EntityType] = &[
    EntityType {
        natural_key: NaturalKey::Column("short_name"),
        transforms: &[("short_name", Transform::Uppercase)],
        ..entity("genes")
    },
    EntityType {
        natural_key: NaturalKey::Column("transcript_id"),
        foreign_keys: &[ForeignKey {
            column: "gene",
            target: "genes",
        }],
        injections: &[Injection {
            column: "gene",
            target: "genes",
            key_column: "short_name",
            fixed: &[],
        }],
        ..entity("transcripts")
    },
    EntityType {
        natural_key: NaturalKey::Column("variant_id"),
        ..entity("variants")
    },
    EntityType {
        natural_key: NaturalKey::Composite(&["transcript", "variant"]),
        foreign_keys: &[
            ForeignKey {
                column: "transcript",
                target: "transcripts",
            },
            VARIANT_FK,
        ],
        ..entity("variants_transcripts")
    },
    EntityType {
        compound_key: Some(VARIANT_TRANSCRIPT_FK),
        transforms: &[(
            "hgvsp",
            Transform::Replace {
                from: "%3D",
                to: "=",
            },
        )],
        ..entity("variants_annotations")
    },
    entity("severities"),
    EntityType {
        compound_key: Some(VARIANT_TRANSCRIPT_FK),
        ..entity("variants_consequences")
    },
    EntityType {
        foreign_keys: &[
            ForeignKey {
                column: "gene",
                target: "genes",
            },
            VARIANT_FK,
        ],
        injections: &[variant_stub(&[("var_type", "SV")])],
        ..entity("sv_consequences")
    },
    EntityType {
        transforms: &[("dbsnp_id", Transform::TakeBefore('&'))],
        injections: &[variant_stub(&[("var_type", "SNV")])],
        ..variant_child("snvs")
    },
    EntityType {
        injections: &[variant_stub(&[("var_type", "SV")])],
        ..variant_child("svs")
    },
    variant_child("svs_ctx"),
    variant_child("str"),
    EntityType {
        injections: &[variant_stub(&[("var_type", "MT")])],
        ..variant_child("mts")
    },
    variant_child("genomic_ibvl_frequencies"),
    variant_child("genomic_gnomad_frequencies"),
    variant_child("mt_ibvl_frequencies"),
    variant_child("mt_gnomad_frequencies"),
];

/// Look up an entity type by table name
pub fn entity_type(name: &str) -> Option<&'static EntityType> {
    ENTITY_TYPES.iter().find(|e| e.name == name)
}

/// Position of an entity type in processing order
pub fn position(name: &str) -> Option<usize> {
    ENTITY_TYPES.iter().position(|e| e.name == name)
}

impl EntityType {
    /// Entity types whose key maps must be loaded while importing this one,
    /// the type itself first
    pub fn required_maps(&self) -> Vec<&'static str> {
        let mut names = vec![self.name];
        let mut push = |name: &'static str| {
            if !names.contains(&name) {
                names.push(name);
            }
        };
        for fk in self.foreign_keys {
            push(fk.target);
        }
        if let Some(compound) = &self.compound_key {
            push(compound.target);
            for part in &compound.parts {
                push(part.target);
            }
        }
        for injection in self.injections {
            push(injection.target);
        }
        names
    }

    /// Source columns carrying natural keys; always read as text
    pub fn key_source_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = self.foreign_keys.iter().map(|fk| fk.column).collect();
        if let Some(compound) = &self.compound_key {
            columns.extend(compound.parts.iter().map(|p| p.column));
        }
        columns
    }

    pub fn injection_for(&self, column: &str) -> Option<&'static Injection> {
        self.injections.iter().find(|i| i.column == column)
    }

    pub fn transform_for(&self, column: &str) -> Option<Transform> {
        self.transforms
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, t)| *t)
    }

    /// Natural key of a stored row, as registered in the key map.
    ///
    /// Single-column keys must be text. Composite keys render each part,
    /// resolved IDs included, and join them with `-`.
    pub fn natural_key_of(&self, row: &Row) -> Option<String> {
        match self.natural_key {
            NaturalKey::None => None,
            NaturalKey::Column(column) => row.text(column).map(str::to_string),
            NaturalKey::Composite(columns) => Some(
                columns
                    .iter()
                    .map(|c| row.get(c).map_or_else(|| Value::Null.to_string(), Value::to_string))
                    .collect::<Vec<_>>()
                    .join("-"),
            ),
        }
    }
}

/// Compound key as registered by the linking entity type
pub fn compound_key(left: Option<i64>, right: Option<i64>) -> String {
    let render = |id: Option<i64>| id.map_or_else(|| Value::Null.to_string(), |i| i.to_string());
    format!("{}-{}", render(left), render(right))
}
