//! Scripted fault injection and call recording for the memory transport.

use crate::cursor::CursorOption;
use crate::errors::{CursorError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Stream operations a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOp {
    Open,
    Advance,
    HasNext,
    Count,
    Explain,
}

#[derive(Debug, Clone)]
enum Trigger {
    /// Fail the next `remaining` calls.
    Next { remaining: u32 },
    /// Let `pass` calls through, then fail once.
    After { pass: u32 },
    Always,
}

#[derive(Debug, Clone)]
struct Fault {
    op: StreamOp,
    trigger: Trigger,
    error: CursorError,
}

/// Failures to inject, shared by a collection and every stream it opens.
///
/// Faults are checked in the order they were added; the first one that fires wins.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Arc<Mutex<Vec<Fault>>>,
}

impl FaultPlan {
    /// Fail the next `times` calls of `op` with `error`.
    pub fn fail_next(&self, op: StreamOp, times: u32, error: CursorError) {
        if times > 0 {
            self.push(op, Trigger::Next { remaining: times }, error);
        }
    }

    /// Let `pass` calls of `op` succeed, then fail one with `error`.
    pub fn fail_after(&self, op: StreamOp, pass: u32, error: CursorError) {
        self.push(op, Trigger::After { pass }, error);
    }

    pub fn fail_always(&self, op: StreamOp, error: CursorError) {
        self.push(op, Trigger::Always, error);
    }

    pub fn clear(&self) {
        self.faults.lock().clear();
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.faults.lock().len()
    }

    fn push(&self, op: StreamOp, trigger: Trigger, error: CursorError) {
        self.faults.lock().push(Fault { op, trigger, error });
    }

    /// Consume one call of `op`, returning the injected error if one fires.
    pub fn check(&self, op: StreamOp) -> Result<()> {
        let mut faults = self.faults.lock();
        let mut fired = None;
        let mut spent = None;
        for (i, fault) in faults.iter_mut().enumerate().filter(|(_, f)| f.op == op) {
            match &mut fault.trigger {
                Trigger::Always => {
                    fired = Some(fault.error.clone());
                }
                Trigger::Next { remaining } => {
                    *remaining -= 1;
                    if *remaining == 0 {
                        spent = Some(i);
                    }
                    fired = Some(fault.error.clone());
                }
                Trigger::After { pass } if *pass == 0 => {
                    spent = Some(i);
                    fired = Some(fault.error.clone());
                }
                Trigger::After { pass } => {
                    *pass -= 1;
                    continue;
                }
            }
            break;
        }
        if let Some(i) = spent {
            faults.remove(i);
        }
        match fired {
            Some(err) => {
                log::debug!("injecting {err} on {op:?}");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

/// One recorded call against a memory stream; `stream` numbers streams from 0 in opening order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamCall {
    Open { stream: usize },
    Apply { stream: usize, option: CursorOption },
    Advance { stream: usize },
    HasNext { stream: usize },
    Count { stream: usize },
    Explain { stream: usize },
    Rewind { stream: usize },
}

/// Ordered record of every call the memory transport received.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<StreamCall>>>,
}

impl CallJournal {
    pub fn record(&self, call: StreamCall) {
        self.calls.lock().push(call);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<StreamCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Number of streams opened so far.
    #[must_use]
    pub fn streams_opened(&self) -> usize {
        self.calls.lock().iter().filter(|c| matches!(c, StreamCall::Open { .. })).count()
    }

    /// Options applied to one stream, in the order they arrived.
    #[must_use]
    pub fn applied(&self, stream: usize) -> Vec<CursorOption> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                StreamCall::Apply { stream: s, option } if *s == stream => Some(option.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of the options applied to one stream.
    #[must_use]
    pub fn applied_names(&self, stream: usize) -> Vec<String> {
        self.applied(stream).iter().map(|o| o.name().to_string()).collect()
    }
}
