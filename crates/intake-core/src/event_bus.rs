//! Broadcast event bus for intake events.
//!
//! Components publish `IntakeEvent`s without knowing who is listening;
//! subscribers receive every event published after they subscribe. Lagging
//! subscribers lose the oldest events rather than blocking publishers.

use intake_types::IntakeEvent;
use tokio::sync::broadcast;

/// Clonable broadcast bus carrying intake events.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<IntakeEvent>,
}

impl EventBus {
	/// Creates a new event bus with the given channel capacity.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns an error when no subscriber exists; publishers that do not
	/// care (the common case) ignore the result.
	pub fn publish(
		&self,
		event: IntakeEvent,
	) -> Result<usize, broadcast::error::SendError<IntakeEvent>> {
		self.sender.send(event)
	}

	/// Creates a new subscription receiving subsequently published events.
	pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
		self.sender.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use intake_types::{IntakeEvent, WorkflowEvent};

	#[tokio::test]
	async fn test_subscribers_receive_published_events() {
		let bus = EventBus::new(16);
		let mut receiver = bus.subscribe();

		bus.publish(IntakeEvent::Workflow(WorkflowEvent::SessionCreated {
			session_id: "s1".into(),
		}))
		.unwrap();

		match receiver.recv().await.unwrap() {
			IntakeEvent::Workflow(WorkflowEvent::SessionCreated { session_id }) => {
				assert_eq!(session_id, "s1");
			},
			other => panic!("unexpected event: {:?}", other),
		}
	}
}
