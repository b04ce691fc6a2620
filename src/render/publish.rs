//! Publish Queue
//!
//! Single-producer queue from the mutation context to the render context.
//! Commands accumulate in a pending batch and are sent together on
//! [`PublishQueue::flush`]; the render context applies a batch in full
//! before any read, so readers never observe half of a logical update.

use crate::render::command::RenderCommand;
use crate::render::fence::{FenceCounter, RenderFence};

/// Commands of one logical mutation.
#[derive(Debug)]
pub struct CommandBatch {
    pub sequence: u64,
    pub commands: Vec<RenderCommand>,
}

/// Creates a connected queue and receiver.
#[must_use]
pub fn channel() -> (PublishQueue, CommandReceiver) {
    let (sender, receiver) = flume::unbounded();
    let completed = FenceCounter::new();
    (
        PublishQueue {
            sender,
            pending: Vec::new(),
            sequence: 0,
            completed: completed.clone(),
        },
        CommandReceiver {
            receiver,
            completed,
        },
    )
}

/// Mutation-context end of the queue.
pub struct PublishQueue {
    sender: flume::Sender<CommandBatch>,
    pending: Vec<RenderCommand>,
    sequence: u64,
    completed: FenceCounter,
}

impl PublishQueue {
    #[inline]
    pub fn push(&mut self, command: RenderCommand) {
        self.pending.push(command);
    }

    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops commands pushed after `mark`, a previous [`Self::pending_len`].
    pub fn discard_since(&mut self, mark: usize) {
        if mark < self.pending.len() {
            log::trace!("Discarded {} unsent command(s)", self.pending.len() - mark);
            self.pending.truncate(mark);
        }
    }

    /// Sends the pending batch. Returns its fence, or `None` if nothing was pending.
    pub fn flush(&mut self) -> Option<RenderFence> {
        if self.pending.is_empty() {
            return None;
        }
        self.sequence += 1;
        let batch = CommandBatch {
            sequence: self.sequence,
            commands: std::mem::take(&mut self.pending),
        };
        let count = batch.commands.len();
        if self.sender.send(batch).is_err() {
            log::warn!("Render context is gone; dropped {count} command(s)");
            // Nothing will ever apply this batch.
            self.completed.advance(self.sequence);
        } else {
            log::trace!("Published batch {} with {count} command(s)", self.sequence);
        }
        Some(self.fence())
    }

    /// Fence of the most recently sent batch.
    #[must_use]
    pub fn fence(&self) -> RenderFence {
        RenderFence::new(self.sequence, self.completed.clone())
    }

    /// Sequence number of the most recently sent batch.
    #[inline]
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.sequence
    }

    /// True once the render context applied everything sent so far.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.completed.completed() >= self.sequence
    }
}

/// Render-context end of the queue.
pub struct CommandReceiver {
    receiver: flume::Receiver<CommandBatch>,
    completed: FenceCounter,
}

impl CommandReceiver {
    /// Next batch, if one is waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<CommandBatch> {
        self.receiver.try_recv().ok()
    }

    /// Marks `sequence` (and everything before it) as applied.
    pub fn mark_applied(&self, sequence: u64) {
        self.completed.advance(sequence);
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialHandle;

    fn invalidate() -> RenderCommand {
        RenderCommand::InvalidateExpressions {
            material: MaterialHandle::default(),
        }
    }

    #[test]
    fn batches_preserve_order_and_grouping() {
        let (mut queue, receiver) = channel();
        assert!(queue.flush().is_none());

        queue.push(invalidate());
        queue.push(invalidate());
        let first = queue.flush().unwrap();
        queue.push(invalidate());
        let second = queue.flush().unwrap();

        let batch = receiver.try_recv().unwrap();
        assert_eq!(batch.sequence, 1);
        assert_eq!(batch.commands.len(), 2);
        receiver.mark_applied(batch.sequence);
        assert!(first.is_complete());
        assert!(!second.is_complete());
        assert!(!queue.is_idle());

        let batch = receiver.try_recv().unwrap();
        assert_eq!(batch.sequence, 2);
        receiver.mark_applied(batch.sequence);
        assert!(second.is_complete());
        assert!(queue.is_idle());
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn discarded_commands_are_never_sent() {
        let (mut queue, receiver) = channel();
        queue.push(invalidate());
        let mark = queue.pending_len();
        queue.push(invalidate());
        queue.push(invalidate());

        queue.discard_since(mark);
        assert_eq!(queue.pending_len(), 1);
        queue.discard_since(5);
        assert_eq!(queue.pending_len(), 1);

        queue.flush().unwrap();
        assert_eq!(receiver.try_recv().unwrap().commands.len(), 1);
    }

    #[test]
    fn dropped_receiver_completes_fences() {
        let (mut queue, receiver) = channel();
        drop(receiver);
        queue.push(invalidate());
        let fence = queue.flush().unwrap();
        assert!(fence.is_complete());
    }
}
