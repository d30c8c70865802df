use std::collections::{HashMap, HashSet};

/// Named fan-out groups. The global channel exists for the process
/// lifetime; topic channels are created on first subscribe and die with
/// their last member. Membership is by session id — a channel never owns
/// a session's lifetime.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    global: HashSet<String>,
    topics: HashMap<String, HashSet<String>>,
}

impl ChannelRegistry {
    pub fn join_global(&mut self, session_id: &str) {
        self.global.insert(session_id.to_string());
    }

    /// Drops a session from the global channel and every topic channel,
    /// deleting topic channels it leaves empty.
    pub fn leave_all(&mut self, session_id: &str) {
        self.global.remove(session_id);
        self.topics.retain(|_, members| {
            members.remove(session_id);
            !members.is_empty()
        });
    }

    pub fn subscribe(&mut self, topic: &str, session_id: &str) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(session_id.to_string());
    }

    pub fn unsubscribe(&mut self, topic: &str, session_id: &str) {
        if let Some(members) = self.topics.get_mut(topic) {
            members.remove(session_id);
            if members.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    pub fn global_members(&self) -> Vec<String> {
        self.global.iter().cloned().collect()
    }

    /// Empty when the topic channel does not exist — a broadcast to a
    /// topic no one watches is a zero-recipient no-op.
    pub fn topic_members(&self, topic: &str) -> Vec<String> {
        self.topics
            .get(topic)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn topic_member_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(HashSet::len).unwrap_or(0)
    }
}
