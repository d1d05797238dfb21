use crate::peer::ice::candidate_type;
use crate::peer::types::{ConnectionState, NetworkCandidate};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use webrtc::peer_connection::RTCPeerConnection;

/// Настройка логирования. `RUST_LOG` имеет приоритет над `default_filter`.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // повторная инициализация (тесты, встраивание) не ошибка
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, cand: &NetworkCandidate) {
    debug!(
        "Trickle {label}: type={} candidate={} sdp_mid={:?} sdp_mline_index={:?}",
        candidate_type(cand),
        cand.candidate,
        cand.sdp_mid,
        cand.sdp_mline_index
    );
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                info!(
                    "STATS {moment}: {}:{} bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                );
            }
        }
    }
}

/// Лог смены состояния соединения с текстом статуса
pub fn log_state(state: ConnectionState) {
    match state {
        ConnectionState::Failed | ConnectionState::Disconnected => {
            warn!("Connection state: {state} ({})", state.status_text())
        }
        _ => info!("Connection state: {state} ({})", state.status_text()),
    }
}
