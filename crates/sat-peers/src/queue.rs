use std::collections::VecDeque;

use sat_signal::PeerId;

/// A request issued before the manager had an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCommand {
    Connect { peer_id: PeerId },
}

/// FIFO buffer of pre-init commands. Drained once, then closed for good.
#[derive(Debug, Default)]
pub struct PendingQueue {
    commands: VecDeque<PendingCommand>,
    closed: bool,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Once drained, the command is handed back so the
    /// caller can run it live.
    pub fn enqueue(&mut self, command: PendingCommand) -> Result<(), PendingCommand> {
        if self.closed {
            return Err(command);
        }
        self.commands.push_back(command);
        Ok(())
    }

    /// Take everything queued so far, in issue order, and close the queue.
    /// Later calls return nothing.
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        self.closed = true;
        self.commands.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.closed
    }
}
