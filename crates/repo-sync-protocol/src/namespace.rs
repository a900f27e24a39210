//! Request names under the shared sync prefix.
//!
//! ```text
//! <prefix>/sync/<digestHex>
//! <prefix>/fetch/<creator...>/<seq>
//! <prefix>/recovery/<digestHex>
//! ```

use std::fmt;

use repo_sync_core::{DigestValue, Name};

use crate::error::{Result, SyncError};

const SYNC: &str = "sync";
const FETCH: &str = "fetch";
const RECOVERY: &str = "recovery";

/// A parsed request under the sync prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncRequest {
    /// "My root is D; tell me what I am missing."
    Sync(DigestValue),
    /// "Send me action `seq` of `creator`."
    Fetch { creator: Name, seq: u64 },
    /// "I cannot explain D; send me your full creator table."
    Recovery(DigestValue),
}

impl SyncRequest {
    /// Build the full request name under `prefix`.
    pub fn to_name(&self, prefix: &Name) -> Result<Name> {
        let name = match self {
            SyncRequest::Sync(digest) => prefix.clone().try_append(SYNC)?.try_append(digest.to_hex())?,
            SyncRequest::Fetch { creator, seq } => {
                prefix.clone().try_append(FETCH)?.join(creator).append_seq(*seq)
            }
            SyncRequest::Recovery(digest) => {
                prefix.clone().try_append(RECOVERY)?.try_append(digest.to_hex())?
            }
        };
        Ok(name)
    }

    /// Parse a request name. `name` must start with `prefix`.
    pub fn parse(prefix: &Name, name: &Name) -> Result<Self> {
        if !prefix.is_prefix_of(name) || name.len() <= prefix.len() + 1 {
            return Err(SyncError::UnsupportedRequest(name.to_uri()));
        }
        let kind = name.get(prefix.len()).unwrap_or_default();
        let rest = name.sub_name(prefix.len() + 1, name.len());

        match kind {
            SYNC => Ok(SyncRequest::Sync(parse_digest(&rest)?)),
            RECOVERY => Ok(SyncRequest::Recovery(parse_digest(&rest)?)),
            FETCH => {
                let seq = rest.last_seq().ok_or_else(|| {
                    SyncError::MalformedMessage(format!("fetch name without seq: {name}"))
                })?;
                let creator = rest.parent();
                if creator.is_empty() {
                    return Err(SyncError::MalformedMessage(format!(
                        "fetch name without creator: {name}"
                    )));
                }
                Ok(SyncRequest::Fetch { creator, seq })
            }
            other => Err(SyncError::UnsupportedRequest(format!(
                "unknown request type {other:?} in {name}"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncRequest::Sync(_) => SYNC,
            SyncRequest::Fetch { .. } => FETCH,
            SyncRequest::Recovery(_) => RECOVERY,
        }
    }
}

fn parse_digest(rest: &Name) -> Result<DigestValue> {
    if rest.len() != 1 {
        return Err(SyncError::MalformedMessage(format!(
            "expected one digest component, got {rest}"
        )));
    }
    let hex = rest.get(0).unwrap_or_default();
    Ok(DigestValue::from_hex(hex)?)
}

impl fmt::Display for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncRequest::Sync(d) => write!(f, "sync({d})"),
            SyncRequest::Fetch { creator, seq } => write!(f, "fetch({creator}/{seq})"),
            SyncRequest::Recovery(d) => write!(f, "recovery({d})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repo_sync_core::Digest;

    fn prefix() -> Name {
        Name::parse("/ndn/broadcast").unwrap()
    }

    #[test]
    fn test_sync_name_layout() {
        let digest = Digest::of_str("/root");
        let name = SyncRequest::Sync(digest).to_name(&prefix()).unwrap();
        assert_eq!(name.to_uri(), format!("/ndn/broadcast/sync/{}", digest.to_hex()));
        assert_eq!(SyncRequest::parse(&prefix(), &name).unwrap(), SyncRequest::Sync(digest));
    }

    #[test]
    fn test_fetch_with_multi_component_creator() {
        let request = SyncRequest::Fetch {
            creator: Name::parse("/site/repo/a").unwrap(),
            seq: 17,
        };
        let name = request.to_name(&prefix()).unwrap();
        assert_eq!(name.to_uri(), "/ndn/broadcast/fetch/site/repo/a/17");
        assert_eq!(SyncRequest::parse(&prefix(), &name).unwrap(), request);
    }

    #[test]
    fn test_recovery_roundtrip() {
        let digest = Digest::of_str("x");
        let request = SyncRequest::Recovery(digest);
        let name = request.to_name(&prefix()).unwrap();
        assert_eq!(SyncRequest::parse(&prefix(), &name).unwrap(), request);
    }

    #[test]
    fn test_unknown_type_unsupported() {
        let name = Name::parse("/ndn/broadcast/publish/abc").unwrap();
        assert!(matches!(
            SyncRequest::parse(&prefix(), &name),
            Err(SyncError::UnsupportedRequest(_))
        ));
    }

    #[test]
    fn test_bad_digest_and_missing_seq() {
        let bad = Name::parse("/ndn/broadcast/sync/nothex").unwrap();
        assert!(SyncRequest::parse(&prefix(), &bad).is_err());
        let no_seq = Name::parse("/ndn/broadcast/fetch/a/b").unwrap();
        assert!(SyncRequest::parse(&prefix(), &no_seq).is_err());
        let no_creator = Name::parse("/ndn/broadcast/fetch/3").unwrap();
        assert!(SyncRequest::parse(&prefix(), &no_creator).is_err());
    }

    #[test]
    fn test_outside_prefix() {
        let name = Name::parse("/data/x").unwrap();
        assert!(SyncRequest::parse(&prefix(), &name).is_err());
    }
}
