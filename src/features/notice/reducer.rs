use serde::Deserialize;
use serde::Serialize;

use crate::Result;
use crate::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Notice {
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub severity: String,
}

/// Ordered notices shown to one role
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeDocument {
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum NoticeRequest {
    Clear,
    Add {
        notice: Notice,
    },
    /// Not supported: there is no agreed way to match the notice to remove
    Remove,
    /// Add a notice of `kind` unless one is already present
    IncludeKind {
        kind: String,
        #[serde(default)]
        notice: Option<Notice>,
    },
    /// Drop every notice of `kind`
    ExcludeKind {
        kind: String,
    },
}

impl NoticeRequest {
    pub fn action(&self) -> &'static str {
        match self {
            NoticeRequest::Clear => "clear",
            NoticeRequest::Add { .. } => "add",
            NoticeRequest::Remove => "remove",
            NoticeRequest::IncludeKind { .. } => "includeKind",
            NoticeRequest::ExcludeKind { .. } => "excludeKind",
        }
    }
}

/// Apply `request` to `doc`. Returns whether the document changed.
///
/// Requests are validated before anything is touched, so an `Err` always
/// leaves `doc` as it was.
pub fn process(
    doc: &mut NoticeDocument,
    request: NoticeRequest,
) -> Result<bool> {
    match request {
        NoticeRequest::Clear => {
            let changed = !doc.notices.is_empty();
            doc.notices.clear();
            Ok(changed)
        }
        NoticeRequest::Add { notice } => {
            if notice.kind.is_empty() && notice.title.is_empty() {
                return Err(ValidationError::InvalidNotice("notice needs a kind or a title").into());
            }
            doc.notices.push(notice);
            Ok(true)
        }
        NoticeRequest::Remove => Err(ValidationError::Unsupported("remove").into()),
        NoticeRequest::IncludeKind { kind, notice } => {
            if kind.is_empty() {
                return Err(ValidationError::InvalidNotice("kind is required").into());
            }
            if doc.notices.iter().any(|n| n.kind == kind) {
                return Ok(false);
            }
            let mut notice = notice.unwrap_or_default();
            notice.kind = kind;
            doc.notices.push(notice);
            Ok(true)
        }
        NoticeRequest::ExcludeKind { kind } => {
            if kind.is_empty() {
                return Err(ValidationError::InvalidNotice("kind is required").into());
            }
            let before = doc.notices.len();
            doc.notices.retain(|n| n.kind != kind);
            Ok(doc.notices.len() != before)
        }
    }
}
