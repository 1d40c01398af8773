//! Ephemeral per-connection presence: cursors, selections and live strokes.
//!
//! Presence never touches the layer store. It travels as JSON messages through a
//! [`PresenceChannel`]; the transport drops a connection's record when it leaves.

use crate::layers::{LayerId, Rgb, StrokePoint};
use crate::stroke::StrokeDraft;
use crate::tools::ToolSettings;
use kurbo::Point;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Transport-assigned id of one connection.
pub type ConnectionId = u64;

/// Cursor colors for remote participants, picked by connection id.
pub const CURSOR_PALETTE: [&str; 5] = ["#DC2626", "#D97706", "#059669", "#7C3AED", "#DB2777"];

/// Presence errors.
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("Malformed presence message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Presence channel error: {0}")]
    Channel(String),
}

/// Result type for presence operations.
pub type PresenceResult<T> = Result<T, PresenceError>;

/// One connection's presence record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Cursor in canvas coordinates, absent when the pointer left the canvas.
    pub cursor: Option<Point>,
    pub selection: Vec<LayerId>,
    /// In-progress freehand stroke in canvas coordinates.
    pub pencil_draft: Option<Vec<StrokePoint>>,
    pub pen_color: Option<Rgb>,
    pub stroke_width: Option<f64>,
    pub is_editing_text: bool,
    pub last_active_ms: u64,
}

impl Presence {
    /// Overwrite the fields carried by `update`.
    pub fn apply(&mut self, update: &PresenceUpdate) {
        if let Some(cursor) = update.cursor {
            self.cursor = cursor;
        }
        if let Some(selection) = &update.selection {
            self.selection = selection.clone();
        }
        if let Some(draft) = &update.pencil_draft {
            self.pencil_draft = draft.clone();
        }
        if let Some(color) = update.pen_color {
            self.pen_color = Some(color);
        }
        if let Some(width) = update.stroke_width {
            self.stroke_width = Some(width);
        }
        if let Some(editing) = update.is_editing_text {
            self.is_editing_text = editing;
        }
        if let Some(at) = update.last_active_ms {
            self.last_active_ms = at;
        }
    }
}

// A present `null` becomes `Some(None)`, so "clear this field" survives the wire.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A partial presence write. `None` fields are left untouched by receivers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "explicit_null")]
    pub cursor: Option<Option<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Vec<LayerId>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "explicit_null")]
    pub pencil_draft: Option<Option<Vec<StrokePoint>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pen_color: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_editing_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_ms: Option<u64>,
}

/// Presence wire messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceMessage {
    /// A connection appeared; `user_id` is looked up in the member directory.
    Joined {
        connection_id: ConnectionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// A connection went away; its presence is discarded.
    Left { connection_id: ConnectionId },
    /// A partial presence write from one connection.
    Update {
        connection_id: ConnectionId,
        update: PresenceUpdate,
    },
}

/// What an incoming message did.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Joined(ConnectionId),
    Left(ConnectionId),
    Updated(ConnectionId),
}

/// Another connection's presence as seen locally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteParticipant {
    pub connection_id: ConnectionId,
    pub user_id: Option<String>,
    pub presence: Presence,
}

/// Per-connection ephemeral channel.
pub trait PresenceChannel {
    /// Send a partial update of the local presence.
    fn publish(&mut self, update: &PresenceUpdate) -> PresenceResult<()>;

    /// Presence of every other connection.
    fn others(&self) -> Vec<RemoteParticipant>;
}

/// A presence channel that queues outgoing JSON for the transport to send and
/// folds incoming JSON into a table of remote participants.
#[derive(Debug, Clone, Default)]
pub struct QueuedPresenceChannel {
    connection_id: ConnectionId,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
    peers: BTreeMap<ConnectionId, RemoteParticipant>,
}

impl QueuedPresenceChannel {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            ..Self::default()
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Announce this connection. Queues the join message.
    pub fn join(&mut self, user_id: Option<String>) -> PresenceResult<()> {
        self.queue(&PresenceMessage::Joined {
            connection_id: self.connection_id,
            user_id,
        })
    }

    /// Announce that this connection is leaving.
    pub fn leave(&mut self) -> PresenceResult<()> {
        self.queue(&PresenceMessage::Left {
            connection_id: self.connection_id,
        })
    }

    fn queue(&mut self, message: &PresenceMessage) -> PresenceResult<()> {
        self.outgoing.push(serde_json::to_string(message)?);
        Ok(())
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Handle an incoming message. Messages about this connection are ignored.
    pub fn handle_message(&mut self, json: &str) -> PresenceResult<Option<PresenceEvent>> {
        let message: PresenceMessage = match serde_json::from_str(json) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Dropping malformed presence message: {e}");
                return Err(e.into());
            }
        };

        let event = match message {
            PresenceMessage::Joined { connection_id, .. }
            | PresenceMessage::Left { connection_id }
            | PresenceMessage::Update { connection_id, .. }
                if connection_id == self.connection_id =>
            {
                None
            }
            PresenceMessage::Joined { connection_id, user_id } => {
                log::info!("Connection {connection_id} joined");
                let peer = self.peer_mut(connection_id);
                peer.user_id = user_id;
                Some(PresenceEvent::Joined(connection_id))
            }
            PresenceMessage::Left { connection_id } => {
                log::info!("Connection {connection_id} left");
                self.peers.remove(&connection_id);
                Some(PresenceEvent::Left(connection_id))
            }
            PresenceMessage::Update { connection_id, update } => {
                self.peer_mut(connection_id).presence.apply(&update);
                Some(PresenceEvent::Updated(connection_id))
            }
        };
        Ok(event)
    }

    fn peer_mut(&mut self, connection_id: ConnectionId) -> &mut RemoteParticipant {
        self.peers.entry(connection_id).or_insert_with(|| RemoteParticipant {
            connection_id,
            ..RemoteParticipant::default()
        })
    }
}

impl PresenceChannel for QueuedPresenceChannel {
    fn publish(&mut self, update: &PresenceUpdate) -> PresenceResult<()> {
        self.queue(&PresenceMessage::Update {
            connection_id: self.connection_id,
            update: update.clone(),
        })
    }

    fn others(&self) -> Vec<RemoteParticipant> {
        self.peers.values().cloned().collect()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Keeps the local presence record and publishes partial writes of it.
#[derive(Debug)]
pub struct PresenceBroadcaster<C: PresenceChannel> {
    channel: C,
    local: Presence,
}

impl<C: PresenceChannel> PresenceBroadcaster<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            local: Presence::default(),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn local(&self) -> &Presence {
        &self.local
    }

    fn publish(&mut self, mut update: PresenceUpdate) -> PresenceResult<()> {
        update.last_active_ms = Some(now_ms());
        self.local.apply(&update);
        self.channel.publish(&update)
    }

    /// Publish the cursor.
    ///
    /// Pen color and width ride along on every move so that other partial writes
    /// can never leave them unset on the receiving side.
    pub fn move_cursor(&mut self, cursor: Option<Point>, settings: &ToolSettings) -> PresenceResult<()> {
        self.publish(PresenceUpdate {
            cursor: Some(cursor),
            pen_color: Some(settings.pen_color),
            stroke_width: Some(settings.stroke_width),
            ..PresenceUpdate::default()
        })
    }

    pub fn set_selection(&mut self, selection: &[LayerId]) -> PresenceResult<()> {
        if self.local.selection == selection {
            return Ok(());
        }
        self.publish(PresenceUpdate {
            selection: Some(selection.to_vec()),
            ..PresenceUpdate::default()
        })
    }

    /// Publish the in-progress stroke, or clear it.
    pub fn set_pencil_draft(&mut self, draft: Option<&StrokeDraft>) -> PresenceResult<()> {
        let points = draft.map(|d| d.points().to_vec());
        if points.is_none() && self.local.pencil_draft.is_none() {
            return Ok(());
        }
        self.publish(PresenceUpdate {
            pencil_draft: Some(points),
            pen_color: draft.map(|d| d.color()),
            ..PresenceUpdate::default()
        })
    }

    pub fn set_editing_text(&mut self, editing: bool) -> PresenceResult<()> {
        self.publish(PresenceUpdate {
            is_editing_text: Some(editing),
            ..PresenceUpdate::default()
        })
    }
}

/// A workspace member, as returned by the member directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Read-only query for workspace members.
pub trait ParticipantDirectory {
    fn members(&self) -> Vec<Member>;
}

impl ParticipantDirectory for Vec<Member> {
    fn members(&self) -> Vec<Member> {
        self.clone()
    }
}

/// Find the member for `user_id`.
///
/// Ids are not formatted consistently across systems, so an exact match is tried
/// first, then containment in either direction.
pub fn resolve_member(members: &[Member], user_id: &str) -> Option<Member> {
    if user_id.is_empty() {
        return None;
    }
    members
        .iter()
        .find(|m| m.id == user_id)
        .or_else(|| {
            members
                .iter()
                .find(|m| !m.id.is_empty() && (m.id.contains(user_id) || user_id.contains(m.id.as_str())))
        })
        .cloned()
}

/// Cursor color for a connection.
pub fn cursor_color(connection_id: ConnectionId) -> Rgb {
    let hex = CURSOR_PALETTE[(connection_id % CURSOR_PALETTE.len() as u64) as usize];
    Rgb::from_hex(hex).unwrap_or(Rgb::new(0, 0, 0))
}

/// A remote participant ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub connection_id: ConnectionId,
    pub name: String,
    pub avatar: Option<String>,
    pub color: Rgb,
    pub position: Option<Point>,
    pub pencil_draft: Option<Vec<StrokePoint>>,
    pub pen_color: Rgb,
    pub stroke_width: Option<f64>,
}

/// Resolve names and colors for every remote participant.
pub fn remote_cursors(participants: &[RemoteParticipant], directory: &dyn ParticipantDirectory) -> Vec<RemoteCursor> {
    let members = directory.members();
    participants
        .iter()
        .map(|p| {
            let member = p.user_id.as_deref().and_then(|uid| resolve_member(&members, uid));
            let (name, avatar) = match member {
                Some(m) => (m.name, m.avatar),
                None => (format!("User {}", p.connection_id), None),
            };
            RemoteCursor {
                connection_id: p.connection_id,
                name,
                avatar,
                color: cursor_color(p.connection_id),
                position: p.presence.cursor,
                pencil_draft: p.presence.pencil_draft.clone(),
                pen_color: p.presence.pen_color.unwrap_or(Rgb::new(0, 0, 0)),
                stroke_width: p.presence.stroke_width,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<Member> {
        vec![
            Member {
                id: "user_2abc".into(),
                name: "Ada".into(),
                avatar: Some("ada.png".into()),
            },
            Member {
                id: "u-77".into(),
                name: "Grace".into(),
                avatar: None,
            },
        ]
    }

    #[test]
    fn test_update_omits_unset_fields() {
        let update = PresenceUpdate {
            cursor: Some(None),
            is_editing_text: Some(true),
            ..PresenceUpdate::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"cursor":null,"is_editing_text":true}"#);
    }

    #[test]
    fn test_null_clears_but_missing_keeps() {
        let mut presence = Presence {
            cursor: Some(Point::new(1.0, 2.0)),
            pen_color: Some(Rgb::new(1, 1, 1)),
            ..Presence::default()
        };

        let keep: PresenceUpdate = serde_json::from_str(r#"{"is_editing_text":true}"#).unwrap();
        presence.apply(&keep);
        assert_eq!(presence.cursor, Some(Point::new(1.0, 2.0)));

        let clear: PresenceUpdate = serde_json::from_str(r#"{"cursor":null}"#).unwrap();
        presence.apply(&clear);
        assert_eq!(presence.cursor, None);
        assert_eq!(presence.pen_color, Some(Rgb::new(1, 1, 1)));
    }

    #[test]
    fn test_channel_tracks_peers() {
        let mut alice = QueuedPresenceChannel::new(1);
        let mut bob = QueuedPresenceChannel::new(2);

        alice.join(Some("user_2abc".into())).unwrap();
        alice
            .publish(&PresenceUpdate {
                cursor: Some(Some(Point::new(5.0, 6.0))),
                ..PresenceUpdate::default()
            })
            .unwrap();

        let events: Vec<_> = alice
            .take_outgoing()
            .iter()
            .map(|m| bob.handle_message(m).unwrap())
            .collect();
        assert_eq!(events, vec![Some(PresenceEvent::Joined(1)), Some(PresenceEvent::Updated(1))]);

        let others = bob.others();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].user_id.as_deref(), Some("user_2abc"));
        assert_eq!(others[0].presence.cursor, Some(Point::new(5.0, 6.0)));

        alice.leave().unwrap();
        for message in alice.take_outgoing() {
            bob.handle_message(&message).unwrap();
        }
        assert!(bob.others().is_empty());
    }

    #[test]
    fn test_own_messages_ignored() {
        let mut channel = QueuedPresenceChannel::new(9);
        channel.join(None).unwrap();
        let echoed = channel.take_outgoing();
        assert_eq!(channel.handle_message(&echoed[0]).unwrap(), None);
        assert!(channel.others().is_empty());
    }

    #[test]
    fn test_malformed_message() {
        let mut channel = QueuedPresenceChannel::new(1);
        assert!(matches!(
            channel.handle_message(r#"{"type":"wave"}"#),
            Err(PresenceError::Malformed(_))
        ));
    }

    #[test]
    fn test_move_cursor_reasserts_pen() {
        let mut broadcaster = PresenceBroadcaster::new(QueuedPresenceChannel::new(1));
        let settings = ToolSettings {
            pen_color: Rgb::new(5, 150, 105),
            stroke_width: 4.0,
        };
        broadcaster.move_cursor(Some(Point::new(3.0, 4.0)), &settings).unwrap();

        let sent = broadcaster.channel_mut().take_outgoing();
        let PresenceMessage::Update { update, .. } = serde_json::from_str(&sent[0]).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(update.cursor, Some(Some(Point::new(3.0, 4.0))));
        assert_eq!(update.pen_color, Some(Rgb::new(5, 150, 105)));
        assert_eq!(update.stroke_width, Some(4.0));
        assert!(broadcaster.local().last_active_ms > 0);
    }

    #[test]
    fn test_draft_cleared_once() {
        let mut broadcaster = PresenceBroadcaster::new(QueuedPresenceChannel::new(1));
        let draft = StrokeDraft::start(Point::new(1.0, 1.0), 0.5, Rgb::new(0, 0, 0));
        broadcaster.set_pencil_draft(Some(&draft)).unwrap();
        broadcaster.set_pencil_draft(None).unwrap();
        broadcaster.set_pencil_draft(None).unwrap();
        assert_eq!(broadcaster.channel_mut().take_outgoing().len(), 2);
        assert!(broadcaster.local().pencil_draft.is_none());
    }

    #[test]
    fn test_resolve_member() {
        let members = members();
        assert_eq!(resolve_member(&members, "u-77").unwrap().name, "Grace");
        // Directory id contains the presence id.
        assert_eq!(resolve_member(&members, "2abc").unwrap().name, "Ada");
        // Presence id contains the directory id.
        assert_eq!(resolve_member(&members, "org:user_2abc").unwrap().name, "Ada");
        assert!(resolve_member(&members, "nobody").is_none());
        assert!(resolve_member(&members, "").is_none());
    }

    #[test]
    fn test_remote_cursor_fallback_name_and_palette() {
        let participants = vec![
            RemoteParticipant {
                connection_id: 7,
                user_id: Some("ghost".into()),
                presence: Presence::default(),
            },
            RemoteParticipant {
                connection_id: 5,
                user_id: Some("u-77".into()),
                presence: Presence {
                    cursor: Some(Point::new(10.0, 10.0)),
                    ..Presence::default()
                },
            },
        ];
        let cursors = remote_cursors(&participants, &members());
        assert_eq!(cursors[0].name, "User 7");
        assert_eq!(cursors[0].color, Rgb::from_hex("#D97706").unwrap());
        assert_eq!(cursors[1].name, "Grace");
        assert_eq!(cursors[1].color, Rgb::from_hex("#DC2626").unwrap());
        assert_eq!(cursors[1].position, Some(Point::new(10.0, 10.0)));
    }
}
