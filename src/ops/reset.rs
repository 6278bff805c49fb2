// src/ops/reset.rs

//! Audited reset of records to an earlier state

use super::ReviewContext;
use crate::record::RecordStatus;
use crate::{Error, Result};
use tracing::info;

/// Move the named records back to `to`
///
/// All records are checked before anything is written; one invalid reset
/// leaves the whole batch untouched.
pub fn reset(ctx: &mut ReviewContext, ids: &[String], to: RecordStatus, reason: &str) -> Result<Vec<String>> {
    let mut records = ctx.load_records()?;

    for id in ids {
        let Some(record) = records.get_mut(id) else {
            ctx.machine.take_audit();
            return Err(Error::UnknownRecord(id.clone()));
        };
        if let Err(e) = ctx.machine.reset(record, to, reason) {
            ctx.machine.take_audit();
            return Err(e);
        }
    }

    info!(records = ids.len(), to = %to, reason, "records reset");
    let summary = format!("Reset {} records to {to}", ids.len());
    let saved = ctx.save_records(&mut records);
    if let Err(e) = saved.and_then(|_| ctx.commit(&summary)) {
        ctx.abort()?;
        return Err(e);
    }
    Ok(ids.to_vec())
}
