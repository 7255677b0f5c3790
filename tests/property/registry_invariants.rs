//! Property-based tests for the connection registry.
//!
//! Uses proptest to drive random connect/setup/join/leave/disconnect
//! sequences and verify:
//! 1. `resolve` never returns a departed connection.
//! 2. `members_of` never returns a departed connection.
//! 3. Identity and room views agree with a plain reference model.
//! 4. Disconnecting twice reports the departure once.

use std::collections::{HashMap, HashSet};

use prochat_proto::ids::ConnectionId;
use prochat_relay::registry::ConnectionRegistry;
use proptest::prelude::*;
use tokio::sync::mpsc;

const USERS: [&str; 3] = ["alice", "bob", "carol"];
const ROOMS: [&str; 3] = ["chat1", "chat2", "meeting1"];

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Setup { conn: usize, user: usize },
    Join { conn: usize, room: usize },
    Leave { conn: usize, room: usize },
    Disconnect { conn: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Connect),
        3 => (any::<usize>(), 0..USERS.len()).prop_map(|(conn, user)| Op::Setup { conn, user }),
        3 => (any::<usize>(), 0..ROOMS.len()).prop_map(|(conn, room)| Op::Join { conn, room }),
        1 => (any::<usize>(), 0..ROOMS.len()).prop_map(|(conn, room)| Op::Leave { conn, room }),
        2 => any::<usize>().prop_map(|conn| Op::Disconnect { conn }),
    ]
}

#[derive(Default)]
struct Model {
    live: HashMap<ConnectionId, (Option<&'static str>, HashSet<&'static str>)>,
}

impl Model {
    fn users_of(&self, user: &str) -> HashSet<ConnectionId> {
        self.live
            .iter()
            .filter(|(_, (u, _))| *u == Some(user))
            .map(|(c, _)| *c)
            .collect()
    }

    fn members_of(&self, room: &str) -> HashSet<ConnectionId> {
        self.live
            .iter()
            .filter(|(_, (_, rooms))| rooms.contains(room))
            .map(|(c, _)| *c)
            .collect()
    }
}

fn pick(all: &[ConnectionId], index: usize) -> Option<ConnectionId> {
    if all.is_empty() {
        None
    } else {
        Some(all[index % all.len()])
    }
}

proptest! {
    #[test]
    fn registry_matches_model(ops in prop::collection::vec(arb_op(), 1..80)) {
        let registry = ConnectionRegistry::new();
        let mut model = Model::default();
        let mut seen: Vec<ConnectionId> = Vec::new();
        let mut departed: HashSet<ConnectionId> = HashSet::new();
        let mut receivers = Vec::new();

        for op in ops {
            match op {
                Op::Connect => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    receivers.push(rx);
                    let conn = registry.on_connect(tx);
                    seen.push(conn);
                    model.live.insert(conn, (None, HashSet::new()));
                }
                Op::Setup { conn, user } => {
                    let Some(conn) = pick(&seen, conn) else { continue };
                    let result = registry.on_setup(conn, USERS[user]);
                    match model.live.get_mut(&conn) {
                        Some(entry) => {
                            prop_assert!(result.is_ok());
                            entry.0 = Some(USERS[user]);
                        }
                        None => prop_assert!(result.is_err()),
                    }
                }
                Op::Join { conn, room } => {
                    let Some(conn) = pick(&seen, conn) else { continue };
                    let result = registry.join(conn, ROOMS[room]);
                    match model.live.get_mut(&conn) {
                        Some(entry) => {
                            let fresh = entry.1.insert(ROOMS[room]);
                            prop_assert_eq!(result.ok(), Some(fresh));
                        }
                        None => prop_assert!(result.is_err()),
                    }
                }
                Op::Leave { conn, room } => {
                    let Some(conn) = pick(&seen, conn) else { continue };
                    let left = registry.leave(conn, ROOMS[room]);
                    let expected = model
                        .live
                        .get_mut(&conn)
                        .is_some_and(|entry| entry.1.remove(ROOMS[room]));
                    prop_assert_eq!(left, expected);
                }
                Op::Disconnect { conn } => {
                    let Some(conn) = pick(&seen, conn) else { continue };
                    let first = registry.on_disconnect(conn);
                    match model.live.remove(&conn) {
                        Some((user, rooms)) => {
                            let departure = first.expect("live connection departs");
                            prop_assert_eq!(departure.user.as_deref(), user);
                            let expected_rooms: HashSet<String> =
                                rooms.iter().map(|r| (*r).to_string()).collect();
                            prop_assert_eq!(departure.rooms, expected_rooms);
                            let still_online =
                                user.is_some_and(|u| !model.users_of(u).is_empty());
                            let went_offline = user.is_some() && !still_online;
                            prop_assert_eq!(departure.user_offline, went_offline);
                            departed.insert(conn);
                        }
                        None => prop_assert!(first.is_none()),
                    }
                    prop_assert!(registry.on_disconnect(conn).is_none());
                }
            }

            for user in USERS {
                let resolved = registry.resolve(user);
                prop_assert!(resolved.is_disjoint(&departed));
                prop_assert_eq!(resolved, model.users_of(user));
            }
            for room in ROOMS {
                let members = registry.members_of(room);
                prop_assert!(members.is_disjoint(&departed));
                prop_assert_eq!(members, model.members_of(room));
            }
            prop_assert_eq!(registry.connection_count(), model.live.len());
        }
    }
}
