//! Bounded request queue between gameplay threads and the render thread.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::state::AnimationRequest;
use crate::error::{RenderError, RenderResult};

/// Producer handle for animation requests.
///
/// Cheap to clone and safe to move to any thread. Requests are applied on
/// the render thread at the next `update`.
#[derive(Debug, Clone)]
pub struct AnimationRequester {
    sender: Sender<AnimationRequest>,
}

impl AnimationRequester {
    /// Queues a request without blocking.
    pub fn try_submit(&self, request: AnimationRequest) -> RenderResult<()> {
        match self.sender.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RenderError::AnimationQueueFull),
            Err(TrySendError::Disconnected(_)) => Err(RenderError::AnimationQueueClosed),
        }
    }

    /// Queues a request built from its fields.
    pub fn request(
        &self,
        instance_id: u32,
        sequence_id: u32,
        is_playing: bool,
        is_looping: bool,
    ) -> RenderResult<()> {
        self.try_submit(AnimationRequest {
            instance_id,
            sequence_id,
            is_playing,
            is_looping,
        })
    }
}

/// Consumer end, owned by the animation allocator.
#[derive(Debug)]
pub(crate) struct RequestQueue {
    sender: Sender<AnimationRequest>,
    receiver: Receiver<AnimationRequest>,
}

impl RequestQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    pub(crate) fn requester(&self) -> AnimationRequester {
        AnimationRequester {
            sender: self.sender.clone(),
        }
    }

    /// Takes the requests queued before the call. Requests arriving while
    /// the batch is processed wait for the next frame.
    pub(crate) fn drain_snapshot(&self) -> Vec<AnimationRequest> {
        let pending = self.receiver.len();
        let mut batch = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.receiver.try_recv() {
                Ok(request) => batch.push(request),
                Err(_) => break,
            }
        }
        batch
    }

    pub(crate) fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Drops every queued request.
    pub(crate) fn discard(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_rejects() {
        let queue = RequestQueue::new(2);
        let requester = queue.requester();
        requester.request(0, 0, true, true).unwrap();
        requester.request(1, 0, true, true).unwrap();
        assert_eq!(requester.request(2, 0, true, true), Err(RenderError::AnimationQueueFull));
        assert_eq!(queue.drain_snapshot().len(), 2);
        assert!(requester.request(2, 0, true, true).is_ok());
    }

    #[test]
    fn test_requests_from_other_threads() {
        let queue = RequestQueue::new(64);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let requester = queue.requester();
                std::thread::spawn(move || {
                    for i in 0..8 {
                        requester.request(t * 8 + i, 0, true, false).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let mut ids: Vec<u32> = queue.drain_snapshot().iter().map(|r| r.instance_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_closed_after_consumer_drops() {
        let queue = RequestQueue::new(4);
        let requester = queue.requester();
        drop(queue);
        assert_eq!(requester.request(0, 0, true, true), Err(RenderError::AnimationQueueClosed));
    }
}
