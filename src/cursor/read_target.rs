use crate::errors::{CursorError, Result};
use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which replica members may serve a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadTargetKind {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadTargetKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadTargetKind {
    type Err = CursorError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "primarypreferred" => Ok(Self::PrimaryPreferred),
            "secondary" => Ok(Self::Secondary),
            "secondarypreferred" => Ok(Self::SecondaryPreferred),
            "nearest" => Ok(Self::Nearest),
            other => Err(CursorError::InvalidReadTarget(format!("unknown mode '{other}'"))),
        }
    }
}

/// Structured read target: a mode plus tag sets that narrow eligible members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadTarget {
    pub kind: ReadTargetKind,
    pub tag_sets: Vec<Document>,
}

impl ReadTarget {
    /// Build a target, rejecting tag sets on `Primary` (there is only one primary to pick).
    pub fn new(kind: ReadTargetKind, tag_sets: Vec<Document>) -> Result<Self> {
        if kind == ReadTargetKind::Primary && !tag_sets.is_empty() {
            return Err(CursorError::InvalidReadTarget(
                "tag sets are not allowed with primary".into(),
            ));
        }
        Ok(Self { kind, tag_sets })
    }

    #[must_use]
    pub fn primary() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of(kind: ReadTargetKind) -> Self {
        Self { kind, tag_sets: Vec::new() }
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut d = doc! { "mode": self.kind.as_str() };
        if !self.tag_sets.is_empty() {
            d.insert("tags", Bson::Array(self.tag_sets.iter().cloned().map(Bson::Document).collect()));
        }
        d
    }
}

/// Converts between the legacy "allow secondary reads" flag and [`ReadTarget`].
///
/// The cursor and the collection layer both go through these functions so the
/// two never disagree about what the legacy flag means.
pub struct ReadTargetTranslator;

impl ReadTargetTranslator {
    /// Allowing secondaries keeps existing tag sets; disallowing resets to a bare primary.
    #[must_use]
    pub fn set_legacy(current: &ReadTarget, allow: bool) -> ReadTarget {
        if allow {
            ReadTarget {
                kind: ReadTargetKind::SecondaryPreferred,
                tag_sets: current.tag_sets.clone(),
            }
        } else {
            ReadTarget::primary()
        }
    }

    #[must_use]
    pub fn to_legacy_boolean(target: &ReadTarget) -> bool {
        target.kind != ReadTargetKind::Primary
    }

    /// Effective target given what was configured locally and what the owner provides.
    ///
    /// A structured target always wins over the legacy flag.
    #[must_use]
    pub fn resolve(
        legacy: Option<bool>,
        structured: Option<&ReadTarget>,
        inherited: &ReadTarget,
    ) -> ReadTarget {
        match (structured, legacy) {
            (Some(target), _) => target.clone(),
            (None, Some(allow)) => Self::set_legacy(inherited, allow),
            (None, None) => inherited.clone(),
        }
    }
}
