//! `chatd-storage` — the storage gateway (C6): pooled, parameterized
//! queries against `agents`, `agent_templates`, `users`, `chat_messages`
//! and `chat_compressed_messages`.

pub mod error;
pub mod gateway;
pub mod pool;
pub mod schema;
pub mod types;

pub use error::{Result, StorageError};
pub use gateway::StorageGateway;
pub use pool::ConnectionPool;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chatd_core::{AgentId, Role};

    fn gateway() -> StorageGateway {
        StorageGateway::new(ConnectionPool::open_in_memory().unwrap())
    }

    #[test]
    fn health_check_ok() {
        assert!(gateway().health_check().is_ok());
    }

    #[test]
    fn insert_and_list_chat_messages() {
        let gw = gateway();
        let conn = gw.health_check();
        assert!(conn.is_ok());

        // seed an agent row directly so FK-ish reads have something.
        let agent_id = AgentId(42);
        let msg = NewChatMessage {
            session_id: "s1".into(),
            agent_id,
            role: Role::User,
            content: "hi".into(),
            emotion: None,
            audio_file_path: None,
            copilot_mode: false,
        };
        let inserted = gw.insert_chat_message(&msg).unwrap();
        assert_eq!(inserted.content, "hi");

        let listed = gw
            .list_chat_messages_since(agent_id, false, None, 100)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].role, Role::User);
    }

    #[test]
    fn copilot_partition_is_isolated() {
        let gw = gateway();
        let agent_id = AgentId(7);
        for (copilot, content) in [(false, "normal"), (true, "copilot")] {
            gw.insert_chat_message(&NewChatMessage {
                session_id: "s".into(),
                agent_id,
                role: Role::User,
                content: content.into(),
                emotion: None,
                audio_file_path: None,
                copilot_mode: copilot,
            })
            .unwrap();
        }
        let normal = gw.list_chat_messages_since(agent_id, false, None, 10).unwrap();
        let copilot = gw.list_chat_messages_since(agent_id, true, None, 10).unwrap();
        assert_eq!(normal.len(), 1);
        assert_eq!(normal[0].content, "normal");
        assert_eq!(copilot.len(), 1);
        assert_eq!(copilot[0].content, "copilot");
    }

    #[test]
    fn latest_compressed_message_picks_newest() {
        let gw = gateway();
        let agent_id = AgentId(9);
        let t1 = chrono::Utc::now();
        gw.insert_compressed_message(&NewChatCompressedMessage {
            agent_id,
            compressed_content: "first".into(),
            content_last_time: t1,
            copilot_mode: false,
        })
        .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        gw.insert_compressed_message(&NewChatCompressedMessage {
            agent_id,
            compressed_content: "second".into(),
            content_last_time: t1,
            copilot_mode: false,
        })
        .unwrap();
        let latest = gw.latest_compressed_message(agent_id, false).unwrap().unwrap();
        assert_eq!(latest.compressed_content, "second");
    }
}
