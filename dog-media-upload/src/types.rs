use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Identifier tying a document element to the loader transferring its file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload ID
    pub fn new() -> Self {
        Self(format!("upl_{}", Uuid::new_v4().simple()))
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UploadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UploadId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

static ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a node in the document tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(u64);

impl ElementId {
    /// Allocate a fresh, process-unique element ID
    pub fn next() -> Self {
        Self(ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transient upload state stored on a media element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Reading,
    Uploading,
    Complete,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Uploading => "uploading",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a loader's transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderStatus {
    Idle,
    Reading,
    Uploading,
    Complete,
    Error,
    Aborted,
}

impl LoaderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Reading => "reading",
            Self::Uploading => "uploading",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Aborted => "aborted",
        }
    }

    /// No further phase change can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Aborted)
    }
}

impl fmt::Display for LoaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Responsive source descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcSet {
    pub data: String,
    pub width: u64,
}

/// Server response of a finished upload: width descriptor (or `default`) to URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadResponse(BTreeMap<String, String>);

impl UploadResponse {
    pub const DEFAULT_KEY: &'static str = "default";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url<K: Into<String>, V: Into<String>>(mut self, key: K, url: V) -> Self {
        self.0.insert(key.into(), url.into());
        self
    }

    /// The URL stored under the reserved `default` key
    pub fn default_url(&self) -> Option<&str> {
        self.0.get(Self::DEFAULT_KEY).map(|s| s.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for UploadResponse {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A user-provided file waiting to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl MediaFile {
    pub fn new<N: Into<String>, M: Into<String>, D: Into<Bytes>>(name: N, mime_type: M, data: D) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Keys of the closed attribute set a media element can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKey {
    Src,
    Alt,
    SrcSet,
    UploadId,
    UploadStatus,
}

impl AttributeKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::Alt => "alt",
            Self::SrcSet => "srcset",
            Self::UploadId => "uploadId",
            Self::UploadStatus => "uploadStatus",
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    Src(String),
    Alt(String),
    SrcSet(SrcSet),
    UploadId(UploadId),
    UploadStatus(UploadStatus),
}

impl Attribute {
    pub fn key(&self) -> AttributeKey {
        match self {
            Self::Src(_) => AttributeKey::Src,
            Self::Alt(_) => AttributeKey::Alt,
            Self::SrcSet(_) => AttributeKey::SrcSet,
            Self::UploadId(_) => AttributeKey::UploadId,
            Self::UploadStatus(_) => AttributeKey::UploadStatus,
        }
    }

    pub fn as_upload_status(&self) -> Option<UploadStatus> {
        match self {
            Self::UploadStatus(status) => Some(*status),
            _ => None,
        }
    }
}

/// Attribute bag of a media element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttributes {
    pub src: Option<String>,
    pub alt: Option<String>,
    pub srcset: Option<SrcSet>,
    pub upload_id: Option<UploadId>,
    pub upload_status: Option<UploadStatus>,
}

impl MediaAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upload_id(mut self, upload_id: UploadId) -> Self {
        self.upload_id = Some(upload_id);
        self
    }

    pub fn with_upload_status(mut self, status: UploadStatus) -> Self {
        self.upload_status = Some(status);
        self
    }

    pub fn with_src<S: Into<String>>(mut self, src: S) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_alt<S: Into<String>>(mut self, alt: S) -> Self {
        self.alt = Some(alt.into());
        self
    }

    pub fn get(&self, key: AttributeKey) -> Option<Attribute> {
        match key {
            AttributeKey::Src => self.src.clone().map(Attribute::Src),
            AttributeKey::Alt => self.alt.clone().map(Attribute::Alt),
            AttributeKey::SrcSet => self.srcset.clone().map(Attribute::SrcSet),
            AttributeKey::UploadId => self.upload_id.clone().map(Attribute::UploadId),
            AttributeKey::UploadStatus => self.upload_status.map(Attribute::UploadStatus),
        }
    }

    /// Set an attribute, returning the previous value
    pub fn set(&mut self, attribute: Attribute) -> Option<Attribute> {
        let old = self.get(attribute.key());
        match attribute {
            Attribute::Src(v) => self.src = Some(v),
            Attribute::Alt(v) => self.alt = Some(v),
            Attribute::SrcSet(v) => self.srcset = Some(v),
            Attribute::UploadId(v) => self.upload_id = Some(v),
            Attribute::UploadStatus(v) => self.upload_status = Some(v),
        }
        old
    }

    /// Remove an attribute, returning the previous value
    pub fn remove(&mut self, key: AttributeKey) -> Option<Attribute> {
        let old = self.get(key);
        match key {
            AttributeKey::Src => self.src = None,
            AttributeKey::Alt => self.alt = None,
            AttributeKey::SrcSet => self.srcset = None,
            AttributeKey::UploadId => self.upload_id = None,
            AttributeKey::UploadStatus => self.upload_status = None,
        }
        old
    }
}

/// Document root an element lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootName {
    Main,
    /// Holding area for removed nodes, kept for undo
    Graveyard,
}

/// Snapshot of a media element as stored in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaElement {
    pub id: ElementId,
    pub root: RootName,
    pub attributes: MediaAttributes,
}

impl MediaElement {
    pub fn upload_id(&self) -> Option<&UploadId> {
        self.attributes.upload_id.as_ref()
    }

    pub fn upload_status(&self) -> Option<UploadStatus> {
        self.attributes.upload_status
    }

    pub fn is_attached(&self) -> bool {
        self.root == RootName::Main
    }
}
