// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Typed variable values and their type tags.
// Author: Lukas Bower

//! Variable values and their type tags.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Value held by a variable node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// 64-bit floating point reading. Only finite readings can be encoded.
    #[serde(serialize_with = "serialize_finite")]
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Signed integer.
    Int(i64),
    /// UTF-8 text.
    String(String),
}

/// Type tag of a [`Value`], fixed per variable at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueTag {
    /// [`Value::Float`].
    Float,
    /// [`Value::Bool`].
    Bool,
    /// [`Value::Timestamp`].
    Timestamp,
    /// [`Value::Int`].
    Int,
    /// [`Value::String`].
    String,
}

impl Value {
    /// Return the type tag of the value.
    #[must_use]
    pub fn tag(&self) -> ValueTag {
        match self {
            Self::Float(_) => ValueTag::Float,
            Self::Bool(_) => ValueTag::Bool,
            Self::Timestamp(_) => ValueTag::Timestamp,
            Self::Int(_) => ValueTag::Int,
            Self::String(_) => ValueTag::String,
        }
    }

    /// Parse `text` as a value of the requested type.
    pub fn parse_as(tag: ValueTag, text: &str) -> Result<Self, ValueParseError> {
        let invalid = || ValueParseError::Invalid {
            tag,
            text: text.to_owned(),
        };
        let value = match tag {
            ValueTag::Float => {
                let reading: f64 = text.trim().parse().map_err(|_| invalid())?;
                if !reading.is_finite() {
                    return Err(invalid());
                }
                Self::Float(reading)
            }
            ValueTag::Bool => Self::Bool(text.trim().parse().map_err(|_| invalid())?),
            ValueTag::Timestamp => Self::Timestamp(
                DateTime::parse_from_rfc3339(text.trim())
                    .map_err(|_| invalid())?
                    .with_timezone(&Utc),
            ),
            ValueTag::Int => Self::Int(text.trim().parse().map_err(|_| invalid())?),
            ValueTag::String => Self::String(text.to_owned()),
        };
        Ok(value)
    }
}

// serde_json would silently encode NaN and infinities as `null`.
fn serialize_finite<S: Serializer>(reading: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !reading.is_finite() {
        return Err(S::Error::custom(format!("non-finite float {reading}")));
    }
    serializer.serialize_f64(*reading)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Timestamp(value) => {
                write!(f, "{}", value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Self::Int(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Float => "Float",
            Self::Bool => "Bool",
            Self::Timestamp => "Timestamp",
            Self::Int => "Int",
            Self::String => "String",
        };
        write!(f, "{label}")
    }
}

/// Failure to parse a value or a value tag from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueParseError {
    /// The text is not a valid value of the requested type.
    #[error("'{text}' is not a valid {tag} value")]
    Invalid {
        /// Requested type.
        tag: ValueTag,
        /// Offending input.
        text: String,
    },
    /// The type name is unknown.
    #[error("unknown value type '{0}'")]
    UnknownTag(String),
}

impl FromStr for ValueTag {
    type Err = ValueParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "float" | "double" | "f64" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            "timestamp" | "datetime" => Ok(Self::Timestamp),
            "int" | "i64" | "int64" => Ok(Self::Int),
            "string" | "str" => Ok(Self::String),
            _ => Err(ValueParseError::UnknownTag(text.to_owned())),
        }
    }
}
