//! Collapse repeated calls with the same prospect to the first one.
//!
//! A prospect that takes three calls before signing up is one opportunity,
//! not three. Within a window only the earliest call per [`ProspectKey`]
//! survives; ties on `datetime` go to the lexicographically smallest id so
//! the result does not depend on input order.

use std::collections::{HashMap, hash_map::Entry};

use serde::{Deserialize, Serialize};

use crate::{
  call::Call,
  prospect::{InternalDirectory, ProspectKey},
};

/// A call paired with the prospect key it was grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectCall {
  pub key:  ProspectKey,
  pub call: Call,
}

#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
  directory: InternalDirectory,
}

impl Deduplicator {
  pub fn new(directory: InternalDirectory) -> Self { Self { directory } }

  /// Keep the earliest call per prospect. Output is sorted by call time.
  pub fn dedupe(&self, calls: impl IntoIterator<Item = Call>) -> Vec<Call> {
    self.dedupe_keyed(calls).into_iter().map(|pc| pc.call).collect()
  }

  /// Like [`Self::dedupe`], but keeps the derived key alongside each call.
  pub fn dedupe_keyed(
    &self,
    calls: impl IntoIterator<Item = Call>,
  ) -> Vec<ProspectCall> {
    let mut earliest: HashMap<ProspectKey, Call> = HashMap::new();

    for call in calls {
      let key = self.directory.prospect_key(&call);
      match earliest.entry(key) {
        Entry::Vacant(slot) => {
          slot.insert(call);
        }
        Entry::Occupied(mut slot) => {
          if precedes(&call, slot.get()) {
            tracing::trace!(
              kept = %call.id,
              dropped = %slot.get().id,
              prospect = %slot.key(),
              "earlier call for prospect"
            );
            slot.insert(call);
          }
        }
      }
    }

    let mut kept: Vec<ProspectCall> = earliest
      .into_iter()
      .map(|(key, call)| ProspectCall { key, call })
      .collect();
    kept.sort_by(|a, b| {
      (a.call.datetime, &a.call.id).cmp(&(b.call.datetime, &b.call.id))
    });
    kept
  }
}

fn precedes(a: &Call, b: &Call) -> bool {
  (a.datetime, &a.id) < (b.datetime, &b.id)
}
