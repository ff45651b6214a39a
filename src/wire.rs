//! Wire codec: archives and assets as signature-tagged generic mappings.
//!
//! The mapping shape is shared with every other serializer of these values,
//! so the keys are fixed protocol constants.  A mapping is recognized by its
//! signature key; deserialization then resolves, in order, `path`, `uri`,
//! and `assets`, falling back to an empty asset map carrying only the hash.
//! Type mismatches are errors, never coerced.
//!
//! [`serde::Serialize`]/[`serde::Deserialize`] impls delegate to the mapping
//! codec, so `Archive` and `Asset` embed directly in any serde document
//! (JSON, YAML, ...).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::archive::{Archive, AssetOrArchive, Backing};
use crate::asset::{Asset, Source};

/// Key under which every signed value carries its type signature.
pub const SIG_KEY: &str = "4dabf18193072939515e22adb298388d";
/// Signature value identifying an archive.
pub const ARCHIVE_SIG: &str = "0def7320c3a5731c473e5ecbe6d01bc7";
/// Signature value identifying a leaf asset.
pub const ASSET_SIG: &str = "c44067f5952c0a294b673a41bacd8c17";

const HASH_KEY: &str = "hash";
const ASSETS_KEY: &str = "assets";
const PATH_KEY: &str = "path";
const URI_KEY: &str = "uri";
const TEXT_KEY: &str = "text";

#[derive(Error, Debug)]
pub enum WireError {
    #[error("unexpected archive {field} of type {found}")]
    UnexpectedArchiveField { field: &'static str, found: &'static str },
    #[error("unexpected asset {field} of type {found}")]
    UnexpectedAssetField { field: &'static str, found: &'static str },
    #[error("archive member '{0}' is not an asset or archive")]
    InvalidMember(String),
    #[error("asset is missing one of text or path")]
    MissingAssetSource,
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null      => "null",
        Value::Bool(_)   => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}

// ── Archive codec ────────────────────────────────────────────────────────────

impl Archive {
    /// Returns a weakly typed mapping carrying the archive signature,
    /// its hash when known, and exactly one backing property.
    pub fn serialize(&self) -> Map<String, Value> {
        let mut obj = Map::new();
        obj.insert(SIG_KEY.to_string(), Value::String(ARCHIVE_SIG.to_string()));
        if let Some(hash) = self.hash() {
            obj.insert(HASH_KEY.to_string(), Value::String(hash.to_string()));
        }
        match &self.backing {
            Backing::Assets(map) => {
                let mut assets = Map::new();
                for (name, member) in map {
                    let value = match member {
                        AssetOrArchive::Asset(asset)    => asset.serialize(),
                        AssetOrArchive::Archive(nested) => nested.serialize(),
                    };
                    assets.insert(name.clone(), Value::Object(value));
                }
                obj.insert(ASSETS_KEY.to_string(), Value::Object(assets));
            }
            Backing::Path(path) => {
                obj.insert(PATH_KEY.to_string(), Value::String(path.to_string_lossy().into_owned()));
            }
            Backing::Uri(uri) => {
                obj.insert(URI_KEY.to_string(), Value::String(uri.clone()));
            }
        }
        obj
    }

    /// Checks whether the mapping carries the archive signature and, if so,
    /// deserializes it; `Ok(None)` means "not an archive".
    pub fn deserialize(obj: &Map<String, Value>) -> Result<Option<Archive>, WireError> {
        if obj.get(SIG_KEY).and_then(Value::as_str) != Some(ARCHIVE_SIG) {
            return Ok(None);
        }

        let hash = match obj.get(HASH_KEY) {
            None => None,
            Some(Value::String(h)) => Some(h.clone()),
            Some(other) => {
                return Err(WireError::UnexpectedArchiveField {
                    field: "hash",
                    found: json_type(other),
                })
            }
        };

        if let Some(value) = obj.get(PATH_KEY) {
            let Value::String(path) = value else {
                return Err(WireError::UnexpectedArchiveField {
                    field: "path",
                    found: json_type(value),
                });
            };
            if !path.is_empty() {
                return Ok(Some(Archive::from_wire(Backing::Path(PathBuf::from(path)), hash)));
            }
        }

        if let Some(value) = obj.get(URI_KEY) {
            let Value::String(uri) = value else {
                return Err(WireError::UnexpectedArchiveField {
                    field: "uri",
                    found: json_type(value),
                });
            };
            if !uri.is_empty() {
                return Ok(Some(Archive::from_wire(Backing::Uri(uri.clone()), hash)));
            }
        }

        if let Some(value) = obj.get(ASSETS_KEY) {
            let Value::Object(members) = value else {
                return Err(WireError::UnexpectedArchiveField {
                    field: "assets",
                    found: json_type(value),
                });
            };
            let mut assets = BTreeMap::new();
            for (name, member) in members {
                let Value::Object(member_obj) = member else {
                    return Err(WireError::InvalidMember(name.clone()));
                };
                if let Some(asset) = Asset::deserialize(member_obj)? {
                    assets.insert(name.clone(), AssetOrArchive::Asset(asset));
                } else if let Some(nested) = Archive::deserialize(member_obj)? {
                    assets.insert(name.clone(), AssetOrArchive::Archive(nested));
                } else {
                    return Err(WireError::InvalidMember(name.clone()));
                }
            }
            return Ok(Some(Archive::from_wire(Backing::Assets(assets), hash)));
        }

        // No non-empty path, no non-empty uri, no assets: an empty asset
        // archive carrying whatever hash was present.
        Ok(Some(Archive::from_wire(Backing::Assets(BTreeMap::new()), hash)))
    }
}

impl Serialize for Archive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Value::Object(self.serialize()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Archive {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let obj = Map::<String, Value>::deserialize(deserializer)?;
        match Archive::deserialize(&obj) {
            Ok(Some(archive)) => Ok(archive),
            Ok(None) => Err(de::Error::custom("mapping does not carry the archive signature")),
            Err(err) => Err(de::Error::custom(err)),
        }
    }
}

// ── Asset codec ──────────────────────────────────────────────────────────────

impl Asset {
    /// Returns a weakly typed mapping carrying the asset signature, its hash
    /// when known, and its text or path source.
    pub fn serialize(&self) -> Map<String, Value> {
        let mut obj = Map::new();
        obj.insert(SIG_KEY.to_string(), Value::String(ASSET_SIG.to_string()));
        if let Some(hash) = self.hash() {
            obj.insert(HASH_KEY.to_string(), Value::String(hash.to_string()));
        }
        match &self.source {
            Source::Text(text) if !text.is_empty() => {
                obj.insert(TEXT_KEY.to_string(), Value::String(text.clone()));
            }
            Source::Text(_) => {}
            Source::Path(path) => {
                obj.insert(PATH_KEY.to_string(), Value::String(path.to_string_lossy().into_owned()));
            }
        }
        obj
    }

    /// Checks whether the mapping carries the asset signature and, if so,
    /// deserializes it; `Ok(None)` means "not an asset".
    pub fn deserialize(obj: &Map<String, Value>) -> Result<Option<Asset>, WireError> {
        if obj.get(SIG_KEY).and_then(Value::as_str) != Some(ASSET_SIG) {
            return Ok(None);
        }

        let hash = match obj.get(HASH_KEY) {
            None => None,
            Some(Value::String(h)) => Some(h.clone()),
            Some(other) => {
                return Err(WireError::UnexpectedAssetField {
                    field: "hash",
                    found: json_type(other),
                })
            }
        };

        if let Some(value) = obj.get(TEXT_KEY) {
            let Value::String(text) = value else {
                return Err(WireError::UnexpectedAssetField {
                    field: "text",
                    found: json_type(value),
                });
            };
            if !text.is_empty() {
                return Ok(Some(Asset::from_wire(Source::Text(text.clone()), hash)));
            }
        }

        if let Some(value) = obj.get(PATH_KEY) {
            let Value::String(path) = value else {
                return Err(WireError::UnexpectedAssetField {
                    field: "path",
                    found: json_type(value),
                });
            };
            if !path.is_empty() {
                return Ok(Some(Asset::from_wire(Source::Path(PathBuf::from(path)), hash)));
            }
        }

        Err(WireError::MissingAssetSource)
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Value::Object(self.serialize()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Asset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let obj = Map::<String, Value>::deserialize(deserializer)?;
        match Asset::deserialize(&obj) {
            Ok(Some(asset)) => Ok(asset),
            Ok(None) => Err(de::Error::custom("mapping does not carry the asset signature")),
            Err(err) => Err(de::Error::custom(err)),
        }
    }
}
