// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A stash for messages that arrive before their round is active.
//!
//! Message delivery order is adversarial: a fast peer's round-3 message can
//! arrive before our round 2 completes. Handlers stash such messages here
//! and drain them when the round boundary is crossed.

use crate::messages::{Message, MessageType};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct MessageQueue {
    queue: HashMap<Vec<u8>, Vec<Message>>,
}

impl MessageQueue {
    fn key(message_type: MessageType) -> Vec<u8> {
        // MessageType is a small closed enum; its encoding is infallible.
        bincode::serialize(&message_type).expect("serializing a message type cannot fail")
    }

    /// Stash a message for later processing.
    pub(crate) fn store(&mut self, message: Message) {
        self.queue
            .entry(Self::key(message.message_type()))
            .or_default()
            .push(message);
    }

    /// Remove and return all stashed messages of the given type.
    pub(crate) fn retrieve_all(&mut self, message_type: MessageType) -> Vec<Message> {
        self.queue
            .remove(&Self::key(message_type))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messages::SignMessageType,
        protocol::{Identifier, ParticipantIdentifier},
        utils::testing::init_testing,
    };

    #[test]
    fn retrieval_drains_only_the_requested_type() {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let pid = ParticipantIdentifier::random(&mut rng);
        let mut queue = MessageQueue::default();

        let ready = Message::new(
            MessageType::Sign(SignMessageType::Ready),
            sid,
            pid,
            pid,
            &(),
        )
        .unwrap();
        let share = Message::new(
            MessageType::Sign(SignMessageType::R4SigShare),
            sid,
            pid,
            pid,
            &(),
        )
        .unwrap();
        queue.store(ready);
        queue.store(share.clone());
        queue.store(share);

        assert_eq!(
            queue
                .retrieve_all(MessageType::Sign(SignMessageType::R4SigShare))
                .len(),
            2
        );
        assert!(queue
            .retrieve_all(MessageType::Sign(SignMessageType::R4SigShare))
            .is_empty());
        assert_eq!(
            queue
                .retrieve_all(MessageType::Sign(SignMessageType::Ready))
                .len(),
            1
        );
    }
}
