use std::sync::Arc;

use tracing::{debug, error, warn};

use tether_core::profiles::profile_map;
use tether_core::{ChatService, GroupService, ProfileLookup, ServiceError, ServiceResult};
use tether_types::events::{GatewayEvent, GroupMessageEvent, InboundFrame, PrivateMessageEvent};

use crate::dispatcher::{Outbox, Presence};

/// Routes inbound frames to the chat or group service and fans the stored
/// message out to whoever is online.
#[derive(Clone)]
pub struct Hub {
    presence: Arc<dyn Presence>,
    chat: ChatService,
    groups: GroupService,
    profiles: Arc<dyn ProfileLookup>,
}

impl Hub {
    pub fn new(
        presence: Arc<dyn Presence>,
        chat: ChatService,
        groups: GroupService,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        Self {
            presence,
            chat,
            groups,
            profiles,
        }
    }

    /// Decode and route one text frame. Errors only ever reach the sender.
    pub async fn handle_text(&self, outbox: &Outbox, text: &str) {
        match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => self.handle_frame(outbox, frame).await,
            Err(e) => {
                warn!(
                    "User {} sent a bad frame: {} -- raw: {}",
                    outbox.user_id(),
                    e,
                    text.chars().take(200).collect::<String>()
                );
                outbox.push(GatewayEvent::error("invalid_params", format!("malformed frame: {e}")));
            }
        }
    }

    pub async fn handle_frame(&self, outbox: &Outbox, frame: InboundFrame) {
        let result = if frame.group_id > 0 {
            self.route_group(outbox, frame).await
        } else {
            self.route_private(outbox, frame).await
        };

        if let Err(e) = result {
            match &e {
                ServiceError::Storage(inner) => error!("Send from user {} failed: {:#}", outbox.user_id(), inner),
                other => debug!("Send from user {} rejected: {}", outbox.user_id(), other),
            }
            outbox.push(GatewayEvent::error(e.kind(), e.public_message()));
        }
    }

    async fn route_private(&self, outbox: &Outbox, frame: InboundFrame) -> ServiceResult<()> {
        let sender_id = outbox.user_id();
        let chat = self.chat.clone();
        let profiles = self.profiles.clone();

        let event = blocking(move || {
            let message = chat.send(sender_id, frame.to, &frame.content, frame.private_message_type())?;
            let mut people = profile_map(profiles.as_ref(), &[message.sender_id, message.receiver_id])?;
            let sender = people.remove(&message.sender_id);
            let receiver = people.remove(&message.receiver_id);
            Ok(PrivateMessageEvent::new(message, sender, receiver))
        })
        .await?;

        let receiver_id = event.receiver_id;
        let event = GatewayEvent::PrivateMessage(event);
        outbox.push(event.clone());
        let delivered = self.presence.send_to_user(receiver_id, event);
        debug!("Private message {} -> {} (delivered: {})", sender_id, receiver_id, delivered);
        Ok(())
    }

    async fn route_group(&self, outbox: &Outbox, frame: InboundFrame) -> ServiceResult<()> {
        let sender_id = outbox.user_id();
        let group_id = frame.group_id;
        let groups = self.groups.clone();
        let profiles = self.profiles.clone();

        let (event, members) = blocking(move || {
            let message = groups.send_message(group_id, sender_id, frame.message_type(), &frame.content)?;
            let sender = profile_map(profiles.as_ref(), &[sender_id])?.remove(&sender_id);
            // Fetched after the insert so members added meanwhile still see it.
            let members = groups.list_member_ids(group_id)?;
            Ok((GroupMessageEvent::new(message, sender), members))
        })
        .await?;

        let event = GatewayEvent::GroupMessage(event);
        outbox.push(event.clone());
        let delivered = self.presence.send_to_users(&members, &event, sender_id);
        debug!(
            "Group message from {} in group {} reached {} of {} members",
            sender_id,
            group_id,
            delivered,
            members.len()
        );
        Ok(())
    }
}

/// Run store-bound work off the async runtime.
async fn blocking<T, F>(f: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Storage(anyhow::anyhow!("blocking task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_db::Database;
    use tokio::sync::mpsc;

    use crate::dispatcher::Dispatcher;

    struct Fixture {
        hub: Hub,
        dispatcher: Dispatcher,
        db: Arc<Database>,
        users: Vec<i64>,
    }

    fn setup() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let users = (1..=4)
            .map(|i| db.create_user(&format!("u{i}@example.com"), "h", &format!("U{i}")).unwrap())
            .collect();
        let dispatcher = Dispatcher::default();
        let hub = Hub::new(
            Arc::new(dispatcher.clone()),
            ChatService::new(db.clone(), db.clone()),
            GroupService::new(db.clone(), db.clone()),
            db.clone(),
        );
        Fixture {
            hub,
            dispatcher,
            db,
            users,
        }
    }

    fn frame(to: i64, group_id: i64, content: &str) -> InboundFrame {
        InboundFrame {
            kind: String::new(),
            to,
            group_id,
            content: content.into(),
            msg_type: String::new(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<GatewayEvent>) -> Vec<GatewayEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn group_message_reaches_online_members_only() {
        let f = setup();
        let (u1, u2, u3, u4) = (f.users[0], f.users[1], f.users[2], f.users[3]);
        let group = f.db.create_group(u1, "crew", "", &[u1, u2, u4]).unwrap();

        let (out1, mut rx1) = f.dispatcher.register_user_channel(u1);
        let (_out2, mut rx2) = f.dispatcher.register_user_channel(u2);
        let (_out3, mut rx3) = f.dispatcher.register_user_channel(u3);

        f.hub.handle_frame(&out1, frame(0, group.id, "hello crew")).await;

        for rx in [&mut rx1, &mut rx2] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            match &events[0] {
                GatewayEvent::GroupMessage(ev) => {
                    assert_eq!(ev.group_id, group.id);
                    assert_eq!(ev.sender_id, u1);
                    assert_eq!(ev.content, "hello crew");
                    assert_eq!(ev.message_type, "text");
                    assert_eq!(ev.sender.as_ref().unwrap().nickname, "U1");
                }
                other => panic!("expected group message, got {other:?}"),
            }
        }
        assert!(drain(&mut rx3).is_empty());
    }

    #[tokio::test]
    async fn non_member_gets_error_frame_only() {
        let f = setup();
        let (u1, u2, u3) = (f.users[0], f.users[1], f.users[2]);
        let group = f.db.create_group(u1, "crew", "", &[u1, u2, f.users[3]]).unwrap();

        let (_out1, mut rx1) = f.dispatcher.register_user_channel(u1);
        let (out3, mut rx3) = f.dispatcher.register_user_channel(u3);

        f.hub.handle_frame(&out3, frame(0, group.id, "let me in")).await;

        assert!(drain(&mut rx1).is_empty());
        let events = drain(&mut rx3);
        assert!(matches!(&events[..], [GatewayEvent::Error { kind, .. }] if kind == "not_a_member"));
    }

    #[tokio::test]
    async fn private_message_echoes_and_delivers() {
        let f = setup();
        let (u1, u2) = (f.users[0], f.users[1]);
        f.db.add_relation(u1, u2).unwrap();
        f.db.add_relation(u2, u1).unwrap();

        let (out1, mut rx1) = f.dispatcher.register_user_channel(u1);
        let (_out2, mut rx2) = f.dispatcher.register_user_channel(u2);

        f.hub.handle_frame(&out1, frame(u2, 0, "hi")).await;

        for rx in [&mut rx1, &mut rx2] {
            match drain(rx).as_slice() {
                [GatewayEvent::PrivateMessage(ev)] => {
                    assert_eq!((ev.sender_id, ev.receiver_id), (u1, u2));
                    assert_eq!(ev.receiver.as_ref().unwrap().nickname, "U2");
                    assert!(!ev.is_read);
                }
                other => panic!("expected one private message, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn private_kind_falls_back_to_frame_type() {
        let f = setup();
        let (u1, u2) = (f.users[0], f.users[1]);
        f.db.add_relation(u1, u2).unwrap();
        f.db.add_relation(u2, u1).unwrap();
        let (out1, mut rx1) = f.dispatcher.register_user_channel(u1);
        let (_out2, mut rx2) = f.dispatcher.register_user_channel(u2);

        let text = format!(r#"{{"type":"image","to":{u2},"content":"pic.png"}}"#);
        f.hub.handle_text(&out1, &text).await;

        let (rows, _) = f.db.list_conversation(u1, u2, 0, 10).unwrap();
        assert_eq!(rows[0].kind, "image");
        for rx in [&mut rx1, &mut rx2] {
            match drain(rx).as_slice() {
                [GatewayEvent::PrivateMessage(ev)] => assert_eq!(ev.message_type, "image"),
                other => panic!("expected one private message, got {other:?}"),
            }
        }

        // Group sends only read msg_type.
        let group = f.db.create_group(u1, "crew", "", &[u1, u2, f.users[2]]).unwrap();
        let text = format!(r#"{{"type":"image","group_id":{},"content":"pic.png"}}"#, group.id);
        f.hub.handle_text(&out1, &text).await;
        match drain(&mut rx2).as_slice() {
            [GatewayEvent::GroupMessage(ev)] => assert_eq!(ev.message_type, "text"),
            other => panic!("expected one group message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_sends_only_notify_the_sender() {
        let f = setup();
        let (u1, u2) = (f.users[0], f.users[1]);
        let (out1, mut rx1) = f.dispatcher.register_user_channel(u1);
        let (_out2, mut rx2) = f.dispatcher.register_user_channel(u2);

        f.hub.handle_frame(&out1, frame(u2, 0, "hi")).await;
        f.hub.handle_text(&out1, "{not json").await;

        let events = drain(&mut rx1);
        let kinds: Vec<_> = events
            .iter()
            .map(|ev| match ev {
                GatewayEvent::Error { kind, .. } => kind.as_str(),
                _ => "unexpected",
            })
            .collect();
        assert_eq!(kinds, vec!["not_friends", "invalid_params"]);
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn offline_recipient_still_gets_history() {
        let f = setup();
        let (u1, u2) = (f.users[0], f.users[1]);
        f.db.add_relation(u1, u2).unwrap();
        f.db.add_relation(u2, u1).unwrap();
        let (out1, mut rx1) = f.dispatcher.register_user_channel(u1);

        f.hub.handle_frame(&out1, frame(u2, 0, "later")).await;

        assert_eq!(drain(&mut rx1).len(), 1);
        let (rows, _) = f.db.list_conversation(u1, u2, 0, 10).unwrap();
        assert_eq!(rows[0].content, "later");
    }
}
