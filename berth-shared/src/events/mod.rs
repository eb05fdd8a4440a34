/// Websocket and pub/sub event envelopes
///
/// [`ServerEvent`] is what sockets receive, [`ClientEvent`] what they send.
/// [`BusEvent`] pairs a server event with the channel it is published on, so
/// the same value travels through the in-process hub and Redis pub/sub.
///
/// # Example
///
/// ```
/// use berth_shared::events::{BusEvent, ServerEvent};
/// use uuid::Uuid;
///
/// let room_id = Uuid::new_v4();
/// let event = BusEvent::room(room_id, ServerEvent::Pong);
/// assert_eq!(event.channel, format!("berth:events:room:{room_id}"));
/// assert_eq!(event.payload().unwrap(), r#"{"type":"pong"}"#);
/// ```

pub mod protocol;

pub use protocol::{BusEvent, ClientEvent, ServerEvent};
