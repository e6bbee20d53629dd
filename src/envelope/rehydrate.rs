//! Response rehydration: replace artifact references with artifact data.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::envelope::{DcqlQuery, SuccessPayload};
use crate::error::EnvelopeError;
use crate::shared::ItemId;

/// Request item id → ordered artifact payloads answering it.
pub type Credentials = BTreeMap<ItemId, Vec<Value>>;

/// Resolve every reference in `payload` to the referenced artifact's `data`.
///
/// Reference order is preserved. A reference outside the artifact array fails
/// the whole rehydration.
pub fn rehydrate(payload: &SuccessPayload) -> Result<Credentials, EnvelopeError> {
    let len = payload.artifacts.len();
    payload
        .answers
        .iter()
        .map(|(item, refs)| {
            let data = refs
                .iter()
                .map(|r| {
                    payload
                        .artifacts
                        .get(r.artifact)
                        .map(|a| a.data.clone())
                        .ok_or_else(|| EnvelopeError::ArtifactOutOfRange {
                            item: item.to_string(),
                            index: r.artifact,
                            len,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((item.clone(), data))
        })
        .collect()
}

/// [`rehydrate`], then list every requested item: ids the source did not
/// answer map to an empty list (not granted).
pub fn rehydrate_for(
    payload: &SuccessPayload,
    query: &DcqlQuery,
) -> Result<Credentials, EnvelopeError> {
    let mut credentials = rehydrate(payload)?;
    for id in query.item_ids() {
        credentials.entry(id.clone()).or_default();
    }
    Ok(credentials)
}
