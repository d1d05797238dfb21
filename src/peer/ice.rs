use crate::peer::types::{NetworkCandidate, ServerConfig};
use crate::utils::add_ice_url_scheme;
use std::collections::HashSet;
use tracing::debug;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Получение конфигурации серверов для webrtc
pub fn to_rtc_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

/// Тип кандидата по SDP-строке: host, srflx, prflx или relay
pub fn candidate_type(candidate: &NetworkCandidate) -> &'static str {
    let mut parts = candidate.candidate.split_whitespace();
    while let Some(part) = parts.next() {
        if part == "typ" {
            return match parts.next() {
                Some("host") => "host",
                Some("srflx") => "srflx",
                Some("prflx") => "prflx",
                Some("relay") => "relay",
                _ => "unknown",
            };
        }
    }
    "unknown"
}

/// Результат приёма удалённого кандидата
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Applied,
    /// remote description ещё не установлен, кандидат отложен
    Buffered,
    Duplicate,
    Ignored,
}

/// Кандидаты, полученные до установки remote description, и уже применённые
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: Vec<NetworkCandidate>,
    seen: HashSet<String>,
}

impl CandidateBuffer {
    pub fn contains(&self, candidate: &NetworkCandidate) -> bool {
        self.seen.contains(&candidate.key())
    }

    /// Откладывает кандидат; `false` для дубликата
    pub fn buffer(&mut self, candidate: NetworkCandidate) -> bool {
        if !self.seen.insert(candidate.key()) {
            return false;
        }
        self.pending.push(candidate);
        true
    }

    /// Отмечает кандидат как применённый; `false` для дубликата
    pub fn mark_applied(&mut self, candidate: &NetworkCandidate) -> bool {
        self.seen.insert(candidate.key())
    }

    /// Забирает отложенные кандидаты в порядке поступления
    pub fn take_pending(&mut self) -> Vec<NetworkCandidate> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            debug!("Flushing {} pending remote candidates", pending.len());
        }
        pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(n: u16) -> NetworkCandidate {
        NetworkCandidate::new(
            format!("candidate:{n} 1 UDP 2130706431 10.0.0.{n} 5000{n} typ host"),
            Some("0"),
            Some(0),
        )
    }

    #[test]
    fn buffer_keeps_arrival_order_and_drops_duplicates() {
        let mut buf = CandidateBuffer::default();
        assert!(buf.buffer(cand(2)));
        assert!(buf.buffer(cand(1)));
        assert!(!buf.buffer(cand(2)));
        assert_eq!(buf.pending_len(), 2);

        let flushed = buf.take_pending();
        assert_eq!(flushed, vec![cand(2), cand(1)]);
        assert_eq!(buf.pending_len(), 0);
        // после выгрузки кандидаты остаются известными
        assert!(buf.contains(&cand(1)));
        assert!(!buf.mark_applied(&cand(1)));
    }

    #[test]
    fn candidate_type_reads_typ_field() {
        assert_eq!(candidate_type(&cand(1)), "host");
        let srflx = NetworkCandidate::new(
            "candidate:2 1 udp 1694498815 203.0.113.7 61000 typ srflx raddr 0.0.0.0 rport 0",
            None,
            None,
        );
        assert_eq!(candidate_type(&srflx), "srflx");
        assert_eq!(candidate_type(&NetworkCandidate::default()), "unknown");
    }

    #[test]
    fn servers_get_url_scheme() {
        let servers = vec![ServerConfig {
            id: "t".into(),
            r#type: "turn".into(),
            url: "turn.example.org:3478".into(),
            username: Some("u".into()),
            credential: Some("p".into()),
        }];
        let rtc = to_rtc_ice_servers(&servers);
        assert_eq!(rtc[0].urls, vec!["turn:turn.example.org:3478".to_string()]);
        assert_eq!(rtc[0].username, "u");
    }
}
