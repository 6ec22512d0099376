//! Per-command wait-reply aggregation.
//!
//! When a client command fans out to several backend shards, one
//! [`WaitReply`] tracks which shards were contacted, records each shard's
//! answer as it arrives from independent backend connections, decides when
//! the command is complete, and merges the collected replies into exactly
//! one client-facing response.
//!
//! Replies for different shards may arrive concurrently on different
//! threads. Each aggregator owns one mutex; the coordinator acquires it
//! via [`WaitReply::lock`] and performs "record reply → check completeness
//! → merge if complete" as a single critical section on the returned
//! [`ReplyGuard`]. That discipline is what makes the final send happen
//! exactly once, with no duplicate and no missed merge when two shards
//! answer back-to-back.
//!
//! Merge output never depends on arrival order: sums are commutative and
//! concatenation follows shard registration order. The first-malformed-
//! reply-wins rule is likewise defined over registration order, so a
//! network race never changes what the client sees.
//!
//! Timeouts live outside this module: a shard that never answers leaves
//! the aggregator in the awaiting state until the coordinator's timer
//! injects a synthetic error via [`WaitReply::set_error`].

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use coral_protocol::Reply;
use tracing::{debug, warn};

use crate::carrier::ReplyCarrier;
use crate::error::ProxyError;
use crate::session::ClientSession;

/// Stable identifier of one backend shard connection.
pub type ShardId = i64;

const STATUS_OK: &str = "ok";
const STATUS_ERROR: &str = "error";

/// Error code rendered when merge is invoked against a slot that never
/// received its reply. A correct coordinator gates merges on
/// [`ReplyGuard::is_complete`], so clients only ever see this if that
/// discipline is broken.
const PROXY_INTERNAL_ERROR: &str = "proxy_error";

/// How a completed command's per-shard replies become one response.
#[derive(Debug)]
enum MergePolicy {
    /// Single-target command: forward the one raw reply untouched.
    Single,
    /// Fan-out command whose per-shard replies are counts to be summed
    /// (multi-set style). Success renders `("ok", total)`.
    Sum,
    /// Fan-out command whose per-shard replies are field lists to be
    /// concatenated in registration order (multi-get style).
    Concat,
    /// No backend involvement: the proxy assembles the field list itself
    /// and the merge just frames and sends it.
    LocalList(Vec<Bytes>),
}

/// One registered shard's pending answer.
#[derive(Debug)]
struct PendingSlot {
    shard: ShardId,
    /// Raw reply bytes, present once the shard has answered.
    raw: Option<Bytes>,
    /// Parsed reply. Only populated for multi-shard Sum/Concat commands,
    /// where merge needs structural access; single-shard replies are
    /// forwarded verbatim and never parsed.
    parsed: Option<Reply>,
}

#[derive(Debug)]
struct WaitState {
    policy: MergePolicy,
    /// Slot order is shard registration order, the order merges respect.
    slots: Vec<PendingSlot>,
    /// Coordinator-declared error. Once set it is never cleared and the
    /// merge renders only the error, regardless of per-shard state.
    error: Option<String>,
    sent: bool,
}

/// Per-command reply aggregator.
///
/// Created by the coordinator when a command is dispatched, fed one
/// [`ReplyCarrier`] per shard as answers arrive, and discarded after
/// [`ReplyGuard::merge_and_send`] has produced the client response.
#[derive(Debug)]
pub struct WaitReply {
    client: Arc<ClientSession>,
    inner: Mutex<WaitState>,
}

impl WaitReply {
    fn with_policy(client: Arc<ClientSession>, policy: MergePolicy) -> Self {
        Self {
            client,
            inner: Mutex::new(WaitState {
                policy,
                slots: Vec::new(),
                error: None,
                sent: false,
            }),
        }
    }

    /// Aggregator for a single-target command: the one reply passes
    /// through verbatim.
    pub fn single(client: Arc<ClientSession>) -> Self {
        Self::with_policy(client, MergePolicy::Single)
    }

    /// Aggregator that sums one integer per shard.
    pub fn sum(client: Arc<ClientSession>) -> Self {
        Self::with_policy(client, MergePolicy::Sum)
    }

    /// Aggregator that concatenates per-shard field lists in registration
    /// order.
    pub fn concat(client: Arc<ClientSession>) -> Self {
        Self::with_policy(client, MergePolicy::Concat)
    }

    /// Response builder for answers the proxy synthesizes itself; no
    /// backend replies are involved. Fields are added with the
    /// [`ReplyGuard::push_owned`] family and framed on merge.
    pub fn local_list(client: Arc<ClientSession>) -> Self {
        Self::with_policy(client, MergePolicy::LocalList(Vec::new()))
    }

    /// The client session this command answers to.
    pub fn client(&self) -> &Arc<ClientSession> {
        &self.client
    }

    /// Registers one target shard.
    ///
    /// Setup phase only: every shard must be registered before its reply
    /// can possibly arrive. Shard ids within one aggregator are unique.
    pub fn register_shard(&self, shard: ShardId) {
        let mut state = self.lock_state();
        debug_assert!(!state.sent, "register_shard after merge_and_send");
        debug_assert!(
            state.slots.iter().all(|s| s.shard != shard),
            "shard {shard} registered twice"
        );
        state.slots.push(PendingSlot {
            shard,
            raw: None,
            parsed: None,
        });
    }

    /// Declares the command failed (shard unreachable, timeout, routing
    /// failure). Takes precedence over any collected shard data; the
    /// first declared code wins and is never cleared.
    ///
    /// Callable at any time, from any thread, without holding the guard.
    pub fn set_error(&self, code: impl Into<String>) {
        let mut state = self.lock_state();
        if state.error.is_none() {
            state.error = Some(code.into());
        }
    }

    /// Returns `true` if an error has been declared.
    pub fn has_error(&self) -> bool {
        self.lock_state().error.is_some()
    }

    /// Acquires this aggregator's lock for the arrival critical section.
    ///
    /// The coordinator must perform "record reply → check completeness →
    /// merge if complete" on one guard; releasing between those steps
    /// re-opens the race this lock exists to close. The guard releases on
    /// drop, including on error paths.
    pub fn lock(&self) -> ReplyGuard<'_> {
        ReplyGuard {
            client: &self.client,
            state: self.lock_state(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, WaitState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive view of one aggregator, held for a record/check/merge
/// critical section.
pub struct ReplyGuard<'a> {
    client: &'a Arc<ClientSession>,
    state: MutexGuard<'a, WaitState>,
}

impl ReplyGuard<'_> {
    /// Records one shard's answer.
    ///
    /// Stores the carrier's raw bytes in the matching slot. For Sum and
    /// Concat commands targeting more than one shard, the reply is parsed
    /// here rather than at merge time, spreading the parse cost across
    /// arrival events instead of loading it all onto whichever thread
    /// delivers the last reply. A reply that fails to parse still counts
    /// as arrived; the merge will take the abort-and-forward path.
    ///
    /// Replies from unregistered shards and duplicate replies are logged
    /// and ignored.
    pub fn record_reply(&mut self, shard: ShardId, mut carrier: ReplyCarrier) {
        // local-list responses are proxy-synthesized, never backend-driven
        if matches!(self.state.policy, MergePolicy::LocalList(_)) {
            return;
        }

        let parse_wanted = matches!(self.state.policy, MergePolicy::Sum | MergePolicy::Concat)
            && self.state.slots.len() > 1;

        let Some(slot) = self.state.slots.iter_mut().find(|s| s.shard == shard) else {
            warn!(shard, "reply from unregistered shard ignored");
            return;
        };
        if slot.raw.is_some() {
            warn!(shard, "duplicate reply from shard ignored");
            return;
        }
        let Some(raw) = carrier.take_raw() else {
            warn!(shard, "empty reply carrier ignored");
            return;
        };

        if parse_wanted {
            slot.parsed = match carrier.take_parsed() {
                Some(reply) => Some(reply),
                None => match coral_protocol::parse_reply(&raw) {
                    Ok(Some((reply, _))) => Some(reply),
                    // leave unparsed; merge forwards the raw bytes
                    Ok(None) | Err(_) => None,
                },
            };
        }
        slot.raw = Some(raw);

        debug!(shard, parsed = slot.parsed.is_some(), "recorded shard reply");
    }

    /// Returns `true` once every registered shard has answered.
    pub fn is_complete(&self) -> bool {
        self.state.slots.iter().all(|s| s.raw.is_some())
    }

    /// Returns `true` if an error has been declared.
    pub fn has_error(&self) -> bool {
        self.state.error.is_some()
    }

    /// Declares the command failed. See [`WaitReply::set_error`].
    pub fn set_error(&mut self, code: impl Into<String>) {
        if self.state.error.is_none() {
            self.state.error = Some(code.into());
        }
    }

    /// Appends one field to a local-list response, taking ownership.
    pub fn push_owned(&mut self, field: Bytes) {
        match &mut self.state.policy {
            MergePolicy::LocalList(fields) => fields.push(field),
            _ => debug_assert!(false, "push on a fan-out aggregator"),
        }
    }

    /// Appends one field to a local-list response, copying the string.
    pub fn push_str(&mut self, field: &str) {
        self.push_owned(Bytes::copy_from_slice(field.as_bytes()));
    }

    /// Appends one field to a local-list response, copying the raw bytes.
    pub fn push_bytes(&mut self, field: &[u8]) {
        self.push_owned(Bytes::copy_from_slice(field));
    }

    /// Merges the collected per-shard state into one response and hands
    /// it to the client session. Terminal: a second call returns
    /// [`ProxyError::AlreadySent`] without sending anything.
    ///
    /// Rendering rules, in precedence order:
    /// 1. A declared error renders `("error", code)` and discards all
    ///    per-shard data.
    /// 2. A single-shard command forwards its one raw reply verbatim.
    /// 3. Sum: every slot must parse as an integer; the total renders as
    ///    `("ok", total)`. Concat: every slot must parse as a field list;
    ///    the lists concatenate in registration order under one `ok`.
    ///    Aggregation is all-or-nothing — the first slot (registration
    ///    order) that fails to parse aborts the merge, and that shard's
    ///    raw reply is forwarded verbatim instead of any partial result.
    pub fn merge_and_send(&mut self) -> Result<(), ProxyError> {
        if self.state.sent {
            return Err(ProxyError::AlreadySent);
        }
        self.state.sent = true;

        let client = self.client;
        let WaitState { policy, slots, error, .. } = &mut *self.state;

        if let Some(code) = error {
            debug!(code = %code, "rendering declared error");
            return send_error(client, code);
        }

        match policy {
            MergePolicy::Single => forward_front(client, slots),
            MergePolicy::Sum if slots.len() == 1 => forward_front(client, slots),
            MergePolicy::Concat if slots.len() == 1 => forward_front(client, slots),
            MergePolicy::Sum => merge_sum(client, slots),
            MergePolicy::Concat => merge_concat(client, slots),
            MergePolicy::LocalList(fields) => send_fields(client, std::mem::take(fields)),
        }
    }
}

// ---------------------------------------------------------------------------
// merge paths
// ---------------------------------------------------------------------------

/// Encodes and sends the fixed two-field error reply.
fn send_error(client: &ClientSession, code: &str) -> Result<(), ProxyError> {
    let packet = {
        let mut enc = client.encoder();
        enc.begin();
        enc.write_str(STATUS_ERROR);
        enc.write_str(code);
        enc.finish()
    };
    client.send_packet(packet)
}

/// Forwards the first slot's raw reply verbatim (single-shard fast path:
/// no parse, no re-encode).
fn forward_front(client: &ClientSession, slots: &[PendingSlot]) -> Result<(), ProxyError> {
    match slots.first().and_then(|s| s.raw.clone()) {
        Some(raw) => client.send_packet(raw),
        None => {
            warn!("merge invoked with no reply recorded");
            send_error(client, PROXY_INTERNAL_ERROR)
        }
    }
}

/// Forwards one failing shard's raw reply in place of any aggregate.
fn abort_with(client: &ClientSession, slot: &PendingSlot) -> Result<(), ProxyError> {
    match slot.raw.clone() {
        Some(raw) => {
            debug!(shard = slot.shard, "aggregation aborted, forwarding shard reply");
            client.send_packet(raw)
        }
        None => {
            warn!(shard = slot.shard, "merge invoked before shard replied");
            send_error(client, PROXY_INTERNAL_ERROR)
        }
    }
}

/// Sums one integer per slot into `("ok", total)`.
fn merge_sum(client: &ClientSession, slots: &[PendingSlot]) -> Result<(), ProxyError> {
    let mut total: i64 = 0;
    for slot in slots {
        match slot.parsed.as_ref().and_then(Reply::to_i64) {
            Some(n) => total = total.wrapping_add(n),
            None => return abort_with(client, slot),
        }
    }

    debug!(shards = slots.len(), total, "merged integer replies");
    let packet = {
        let mut enc = client.encoder();
        enc.begin();
        enc.write_str(STATUS_OK);
        enc.write_i64(total);
        enc.finish()
    };
    client.send_packet(packet)
}

/// Concatenates per-slot field lists, in registration order, under one
/// `ok` status.
fn merge_concat(client: &ClientSession, slots: &[PendingSlot]) -> Result<(), ProxyError> {
    let mut combined: Vec<Bytes> = Vec::new();
    for slot in slots {
        match slot.parsed.as_ref().and_then(Reply::values) {
            Some(values) => combined.extend(values.iter().cloned()),
            None => return abort_with(client, slot),
        }
    }

    debug!(shards = slots.len(), fields = combined.len(), "merged list replies");
    let packet = {
        let mut enc = client.encoder();
        enc.begin();
        enc.write_str(STATUS_OK);
        for field in &combined {
            enc.write_field(field);
        }
        enc.finish()
    };
    client.send_packet(packet)
}

/// Frames and sends a locally assembled field list, exactly as pushed.
fn send_fields(client: &ClientSession, fields: Vec<Bytes>) -> Result<(), ProxyError> {
    let packet = {
        let mut enc = client.encoder();
        enc.begin();
        for field in &fields {
            enc.write_field(field);
        }
        enc.finish()
    };
    client.send_packet(packet)
}
