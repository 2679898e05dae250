//! Command tickets
//!
//! Every bridge operation returns a [`CommandTicket`] at once; the manager
//! resolves it through the paired [`TicketResolver`] when the command has
//! actually finished.

use crate::error::{ErrorCode, FailureReport};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::time::Duration;

pub type CommandOutcome = std::result::Result<(), FailureReport>;

fn dropped() -> FailureReport {
    FailureReport::new(
        ErrorCode::InvalidState,
        "command dropped before completion (engine shut down)",
    )
}

#[derive(Debug)]
pub struct CommandTicket {
    receiver: Option<Receiver<CommandOutcome>>,
    outcome: Option<CommandOutcome>,
}

impl CommandTicket {
    /// A ticket and the resolver that completes it.
    pub fn pair() -> (CommandTicket, TicketResolver) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (
            CommandTicket {
                receiver: Some(receiver),
                outcome: None,
            },
            TicketResolver {
                sender: Some(sender),
            },
        )
    }

    /// A ticket that is already resolved.
    pub fn resolved(outcome: CommandOutcome) -> CommandTicket {
        CommandTicket {
            receiver: None,
            outcome: Some(outcome),
        }
    }

    /// Blocks until the command finishes.
    pub fn wait(mut self) -> CommandOutcome {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        match self.receiver.take() {
            Some(receiver) => receiver.recv().unwrap_or_else(|_| Err(dropped())),
            None => Err(dropped()),
        }
    }

    /// Waits up to `timeout`. `None` if the command is still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<CommandOutcome> {
        if self.outcome.is_none()
            && let Some(receiver) = &self.receiver
        {
            match receiver.recv_timeout(timeout) {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => self.outcome = Some(Err(dropped())),
            }
        }
        self.outcome.clone()
    }

    /// Non-blocking check. `None` if the command is still running.
    pub fn try_result(&mut self) -> Option<CommandOutcome> {
        if self.outcome.is_none()
            && let Some(receiver) = &self.receiver
        {
            match receiver.try_recv() {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => self.outcome = Some(Err(dropped())),
            }
        }
        self.outcome.clone()
    }
}

/// Completes one [`CommandTicket`]. Dropping it unresolved fails the
/// ticket with `INVALID_STATE`.
#[derive(Debug)]
pub struct TicketResolver {
    sender: Option<SyncSender<CommandOutcome>>,
}

impl TicketResolver {
    pub fn resolve(mut self, outcome: CommandOutcome) {
        if let Some(sender) = self.sender.take() {
            // The caller may have dropped its ticket.
            let _ = sender.try_send(outcome);
        }
    }

    pub fn succeed(self) {
        self.resolve(Ok(()));
    }

    pub fn fail(self, report: FailureReport) {
        self.resolve(Err(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolved_from_other_thread() {
        let (ticket, resolver) = CommandTicket::pair();
        let handle = thread::spawn(move || resolver.succeed());
        assert_eq!(ticket.wait(), Ok(()));
        handle.join().unwrap();
    }

    #[test]
    fn test_pending_then_failed() {
        let (mut ticket, resolver) = CommandTicket::pair();
        assert_eq!(ticket.try_result(), None);
        assert_eq!(ticket.wait_timeout(Duration::from_millis(10)), None);

        resolver.fail(FailureReport::new(ErrorCode::NegotiationTimeout, "no answer"));
        let outcome = ticket.wait_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(outcome.unwrap_err().code, ErrorCode::NegotiationTimeout);
        // The outcome stays available.
        assert!(ticket.try_result().unwrap().is_err());
    }

    #[test]
    fn test_dropped_resolver_fails_ticket() {
        let (ticket, resolver) = CommandTicket::pair();
        drop(resolver);
        assert_eq!(ticket.wait().unwrap_err().code, ErrorCode::InvalidState);
    }

    #[test]
    fn test_already_resolved() {
        let ticket = CommandTicket::resolved(Err(FailureReport::new(ErrorCode::EngineBusy, "full")));
        assert_eq!(ticket.wait().unwrap_err().code, ErrorCode::EngineBusy);
    }
}
