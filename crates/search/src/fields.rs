//! Universal metadata fields addressable from query conditions.

use std::borrow::Cow;

use chrono::SecondsFormat;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use smallvec::SmallVec;

use crate::SearchError;

pub const NAME: &str = "name";
pub const NAMESPACE: &str = "namespace";
pub const UID: &str = "uid";
pub const CREATION_TIMESTAMP: &str = "creationTimestamp";
pub const CREATE_TIME: &str = "createTime";
pub const OWNER_KIND: &str = "ownerKind";
pub const OWNER_NAME: &str = "ownerName";
/// Name, any label value or any annotation value.
pub const KEYWORD: &str = "keyword";
pub const LABEL_PREFIX: &str = "label:";
pub const ANNOTATION_PREFIX: &str = "annotation:";
pub const ANNO_PREFIX: &str = "anno:";

/// Candidate values of one field for one object. Empty means the field is absent.
pub type FieldValues<'m> = SmallVec<[Cow<'m, str>; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField<'a> {
    Name,
    Namespace,
    Uid,
    CreationTimestamp,
    Label(&'a str),
    Annotation(&'a str),
    OwnerKind,
    OwnerName,
    Keyword,
}

impl<'a> MetaField<'a> {
    /// Resolve a condition field name. Unknown names are an error, never a silent miss.
    pub fn parse(field: &'a str) -> Result<Self, SearchError> {
        let f = match field {
            NAME => MetaField::Name,
            NAMESPACE => MetaField::Namespace,
            UID => MetaField::Uid,
            CREATION_TIMESTAMP | CREATE_TIME => MetaField::CreationTimestamp,
            OWNER_KIND => MetaField::OwnerKind,
            OWNER_NAME => MetaField::OwnerName,
            KEYWORD => MetaField::Keyword,
            _ => {
                if let Some(key) = field.strip_prefix(LABEL_PREFIX) {
                    MetaField::Label(non_empty_key(field, key)?)
                } else if let Some(key) = field.strip_prefix(ANNOTATION_PREFIX).or_else(|| field.strip_prefix(ANNO_PREFIX)) {
                    MetaField::Annotation(non_empty_key(field, key)?)
                } else {
                    return Err(SearchError::UnknownField(field.to_string()));
                }
            }
        };
        Ok(f)
    }

    pub fn values<'m>(&self, meta: &'m ObjectMeta) -> FieldValues<'m> {
        let mut out = FieldValues::new();
        match *self {
            MetaField::Name => out.extend(meta.name.as_deref().map(Cow::Borrowed)),
            MetaField::Namespace => out.extend(meta.namespace.as_deref().map(Cow::Borrowed)),
            MetaField::Uid => out.extend(meta.uid.as_deref().map(Cow::Borrowed)),
            MetaField::CreationTimestamp => {
                if let Some(ts) = meta.creation_timestamp.as_ref() {
                    out.push(Cow::Owned(ts.0.to_rfc3339_opts(SecondsFormat::Secs, true)));
                }
            }
            MetaField::Label(key) => {
                out.extend(meta.labels.as_ref().and_then(|m| m.get(key)).map(|v| Cow::Borrowed(v.as_str())));
            }
            MetaField::Annotation(key) => {
                out.extend(meta.annotations.as_ref().and_then(|m| m.get(key)).map(|v| Cow::Borrowed(v.as_str())));
            }
            MetaField::OwnerKind => {
                for r in meta.owner_references.iter().flatten() {
                    out.push(Cow::Borrowed(r.kind.as_str()));
                }
            }
            MetaField::OwnerName => {
                for r in meta.owner_references.iter().flatten() {
                    out.push(Cow::Borrowed(r.name.as_str()));
                }
            }
            MetaField::Keyword => {
                out.extend(meta.name.as_deref().map(Cow::Borrowed));
                for v in meta.labels.iter().flat_map(|m| m.values()) {
                    out.push(Cow::Borrowed(v.as_str()));
                }
                for v in meta.annotations.iter().flat_map(|m| m.values()) {
                    out.push(Cow::Borrowed(v.as_str()));
                }
            }
        }
        out
    }
}

fn non_empty_key<'a>(field: &str, key: &'a str) -> Result<&'a str, SearchError> {
    if key.is_empty() { Err(SearchError::UnknownField(field.to_string())) } else { Ok(key) }
}
