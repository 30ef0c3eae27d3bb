use crate::format::format_message;
use crate::*;

/// Functions for handling protocol messages
impl ElectionProcess {
    /// Queues a message to a neighbor (or to ourselves)
    pub(crate) fn send(&self, receiver: ProcessId, payload: Payload, to_send: &mut Vec<Message>) {
        let message = Message::new(self.id, receiver, payload);
        crate::tracing_setup::message_sent(&self.id, &receiver, message.kind().as_str(), format_message(&message, false));
        to_send.push(message);
    }

    /// Processes a received message according to the protocol rules
    ///
    /// This is the entry point for handling messages. It:
    /// 1. Routes the message to the appropriate handler based on its kind
    /// 2. Hands back messages that cannot be interpreted yet
    /// 3. Checks invariants (in debug mode)
    #[tracing::instrument(skip(self, message, to_send), fields(process_id = %self.id, kind = %message.kind()))]
    pub fn process_message(&mut self, message: Message, to_send: &mut Vec<Message>) -> Delivery {
        if message.receiver != self.id {
            crate::tracing_setup::protocol_error(&self.id, "misdelivered", format_message(&message, true));
            return Delivery::Ignored;
        }
        tracing::trace!("received a message");

        let sender = message.sender;
        let delivery = match &message.payload {
            Payload::Connect { level } => self.process_connect(sender, *level, &message, to_send),
            Payload::Initiate {
                level,
                fragment,
                status,
            } => self.process_initiate(sender, *level, *fragment, *status, to_send),
            Payload::Test { level, fragment } => self.process_test(sender, *level, *fragment, &message, to_send),
            Payload::Accept => self.process_accept(sender, &message, to_send),
            Payload::Reject => self.process_reject(sender, &message, to_send),
            Payload::Report { best } => self.process_report(sender, *best, &message, to_send),
            Payload::ChangeRoot { .. } => self.process_change_root(&message, to_send),
            Payload::Finish { leader } => self.process_finish(sender, *leader, &message, to_send),
            Payload::PathPartial(matrix) => self.process_path_partial(sender, matrix, &message, to_send),
            Payload::PathFinal(matrix) => self.process_path_final(sender, matrix, &message, to_send),
            Payload::AckLeader { leader } => self.process_ack_leader(sender, *leader, &message, to_send),
        };

        if let Delivery::Deferred(deferred) = &delivery {
            crate::tracing_setup::message_deferred(&self.id, &deferred.sender, deferred.kind().as_str());
        }

        // Check invariants in debug mode
        if cfg!(debug_assertions) {
            let violations = self.check_invariants();
            assert!(
                violations.is_empty(),
                "Process {} has invariant violations: {:?}",
                self.id,
                violations
            );
            self.peak_level = self.peak_level.max(self.level);
        }

        delivery
    }
}
