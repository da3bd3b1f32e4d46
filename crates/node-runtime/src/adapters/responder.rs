//! Answers queries from a fixed list of shared file names.

use gn_02_query_routing::{keywords, QueryRouteTable};
use gn_05_message_router::{LocalNode, LocalResponder};
use shared_types::{Guid, Message, Payload, QueryReply};

/// Most hits one reply can announce.
const MAX_HITS_PER_REPLY: usize = u8::MAX as usize;

/// One shared file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFile {
    pub index: u32,
    pub name: String,
    pub size_kb: u32,
}

pub struct SharedContentResponder {
    local: LocalNode,
    files: Vec<SharedFile>,
}

impl SharedContentResponder {
    pub fn new(local: LocalNode, files: Vec<SharedFile>) -> Self {
        Self { local, files }
    }

    /// Share `names` with sequential indexes and no size information.
    pub fn from_names(local: LocalNode, names: &[String]) -> Self {
        let files = names
            .iter()
            .enumerate()
            .map(|(i, name)| SharedFile {
                index: u32::try_from(i).unwrap_or(u32::MAX),
                name: name.clone(),
                size_kb: 0,
            })
            .collect();
        Self::new(local, files)
    }

    /// Files whose name holds every keyword of `text`.
    pub fn matching(&self, text: &str) -> Vec<&SharedFile> {
        let words: Vec<String> = keywords(text).iter().map(|w| w.to_lowercase()).collect();
        if words.is_empty() {
            return Vec::new();
        }
        self.files
            .iter()
            .filter(|file| {
                let name = file.name.to_lowercase();
                words.iter().all(|w| name.contains(w.as_str()))
            })
            .collect()
    }

    /// Result records: index, size, name and a double NUL per file.
    fn encode_results(files: &[&SharedFile]) -> Vec<u8> {
        let mut out = Vec::new();
        for file in files {
            out.extend_from_slice(&file.index.to_le_bytes());
            out.extend_from_slice(&file.size_kb.saturating_mul(1024).to_le_bytes());
            out.extend_from_slice(file.name.as_bytes());
            out.extend_from_slice(&[0, 0]);
        }
        out
    }
}

impl LocalResponder for SharedContentResponder {
    fn respond(&self, query: &Message) -> Vec<Message> {
        let Some(request) = query.as_query() else {
            return Vec::new();
        };
        if request.is_urn_query() {
            return Vec::new();
        }
        self.matching(request.text())
            .chunks(MAX_HITS_PER_REPLY)
            .map(|chunk| {
                let hit_count = u8::try_from(chunk.len()).unwrap_or(u8::MAX);
                let reply = QueryReply::new(
                    self.local.client_guid,
                    self.local.ip,
                    self.local.port,
                    hit_count,
                )
                .with_results(Self::encode_results(chunk));
                Message::new(Guid::new_random(), 1, 0, Payload::QueryReply(reply))
            })
            .collect()
    }

    fn route_table(&self) -> QueryRouteTable {
        let mut table = QueryRouteTable::new();
        for file in &self.files {
            table.add(&file.name);
        }
        table
    }

    fn shared_stats(&self) -> (u32, u32) {
        let files = u32::try_from(self.files.len()).unwrap_or(u32::MAX);
        let kilobytes = self
            .files
            .iter()
            .fold(0u32, |total, file| total.saturating_add(file.size_kb));
        (files, kilobytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::QueryRequest;

    fn responder() -> SharedContentResponder {
        SharedContentResponder::new(
            LocalNode::default(),
            vec![
                SharedFile {
                    index: 0,
                    name: "Mozart - Requiem.mp3".to_string(),
                    size_kb: 4_000,
                },
                SharedFile {
                    index: 1,
                    name: "mozart symphony 40.mp3".to_string(),
                    size_kb: 3_000,
                },
            ],
        )
    }

    fn query(text: &str) -> Message {
        Message::new(Guid::new_random(), 3, 0, Payload::Query(QueryRequest::new(text)))
    }

    #[test]
    fn test_all_keywords_must_match() {
        let responder = responder();
        assert_eq!(responder.matching("mozart").len(), 2);
        assert_eq!(responder.matching("MOZART requiem").len(), 1);
        assert!(responder.matching("bach").is_empty());
    }

    #[test]
    fn test_reply_carries_hits() {
        let responder = responder();
        let replies = responder.respond(&query("mozart"));
        assert_eq!(replies.len(), 1);
        let hit = replies[0].as_query_reply().unwrap();
        assert_eq!(hit.hit_count, 2);
        assert!(!hit.results.is_empty());
    }

    #[test]
    fn test_no_match_no_reply() {
        assert!(responder().respond(&query("bach")).is_empty());
    }

    #[test]
    fn test_route_table_covers_files() {
        let table = responder().route_table();
        assert!(table.contains(&QueryRequest::new("requiem")));
        assert!(!table.contains(&QueryRequest::new("zzyzx")));
    }

    #[test]
    fn test_shared_stats() {
        assert_eq!(responder().shared_stats(), (2, 7_000));
    }
}
