//! Shared combinators behind the adapter arities: the binary zip
//! (`Zip2`) and the n-ary join-by-completion
//! (`SignalClient`/`SignalAllDone`).
//!
//! `original_source`'s `_join.py` implements "wait for N streams, discard
//! values, yield once" once and both `_signal_client.py` and
//! `_signal_all_done.py` call it rather than duplicating the loop; this
//! module is that same generalize-don't-duplicate move.

use dfm_core::DfmError;
use futures_util::future::try_join_all;
use futures_util::stream::unfold;
use serde_json::Value;

use crate::adapter::Item;
use crate::stream::Stream;

/// Await completion of every input stream (discarding items, propagating
/// the first error encountered), then return. The caller is responsible
/// for producing its own payload afterwards — this only implements the
/// "wait for all of them" half.
pub async fn join_discarding(streams: &[Stream<Item>]) -> Result<(), DfmError> {
    try_join_all(streams.iter().map(|s| s.drain_to_completion())).await?;
    Ok(())
}

/// Pair positional items from `lhs` and `rhs` into a two-element JSON
/// array, terminating as soon as either side terminates (matching
/// Python's `zip()` semantics, which the source's `Zip2` adapter relies
/// on).
pub fn zip_into(out: &Stream<Item>, lhs: Stream<Item>, rhs: Stream<Item>) {
    let state = (lhs.cursor(), rhs.cursor());
    let source = unfold(state, |(mut lc, mut rc)| async move {
        match (lc.next().await, rc.next().await) {
            (Some(Ok(l)), Some(Ok(r))) => Some((Ok(Value::Array(vec![l, r])), (lc, rc))),
            (Some(Err(e)), _) | (_, Some(Err(e))) => Some((Err(e), (lc, rc))),
            _ => None,
        }
    });
    out.start_from_async_iterator(source);
}
