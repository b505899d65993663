//! Finite State Machine for the incremental fetch protocol.
//!
//! Each state runs in its own `fsm.<State>` span: `Initial` consults the store,
//! `PlainAttempt` or `RangedAttempt` talks to upstream, `Verify` checks the overlap
//! byte of a partial response, `FullReFetch` recovers from a rejected continuation,
//! and `Accepted` hands the classified outcome back.

mod engine;
mod states;

pub(crate) use engine::FetchEngine;
pub use states::FetchOutcome;
