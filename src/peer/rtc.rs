use crate::error::TransportError;
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::ice::to_rtc_ice_servers;
use crate::peer::media::LocalTrack;
use crate::peer::transport::{EventSender, PeerTransport, TransportEventKind, TransportFactory};
use crate::peer::types::{
    ConnectionState, NetworkCandidate, RemoteStream, SdpType, ServerConfig, SessionDescription,
    TrackKind,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Транспорт поверх webrtc-rs
#[derive(Debug, Default, Clone, Copy)]
pub struct RtcTransportFactory;

/// Создает конфигурацию для peer connection
fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: to_rtc_ice_servers(servers),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

fn map_ice_state(state: RTCIceConnectionState) -> ConnectionState {
    match state {
        RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => ConnectionState::New,
        RTCIceConnectionState::Checking => ConnectionState::Checking,
        RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
            ConnectionState::Connected
        }
        RTCIceConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCIceConnectionState::Failed => ConnectionState::Failed,
        RTCIceConnectionState::Closed => ConnectionState::Closed,
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let rtc = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

fn from_rtc_description(desc: RTCSessionDescription) -> Result<SessionDescription, TransportError> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        other => Err(TransportError::Rejected(format!(
            "unsupported description type {other}"
        ))),
    }
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn connect(
        &self,
        ice_servers: &[ServerConfig],
        events: EventSender,
    ) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);

        // Trickle ICE: каждый кандидат отдаём наружу сразу
        let cand_events = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let events = cand_events.clone();
            Box::pin(async move {
                let Some(c) = cand else {
                    debug!("ICE candidate gathering completed (null candidate received)");
                    return;
                };
                match c.to_json() {
                    Ok(init) => {
                        let candidate = NetworkCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        };
                        dump_candidate("LOCAL", &candidate);
                        events.send(TransportEventKind::LocalCandidate(candidate));
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {e}"),
                }
            })
        }));

        let track_events = events.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    other => {
                        debug!("Ignoring remote track of kind {other}");
                        return;
                    }
                };
                info!(
                    "Remote track {} ({kind}) in stream {}",
                    track.id(),
                    track.stream_id()
                );
                events.send(TransportEventKind::RemoteStream(RemoteStream {
                    stream_id: track.stream_id(),
                    track_id: track.id(),
                    kind,
                    track: Some(track),
                }));
            })
        }));

        let pc_stats = Arc::downgrade(&pc);
        pc.on_ice_connection_state_change(Box::new(move |st: RTCIceConnectionState| {
            debug!("ICE connection state changed to: {st}");
            let state = map_ice_state(st);
            events.send(TransportEventKind::StateChanged(state));

            let pc = pc_stats.clone();
            Box::pin(async move {
                if state == ConnectionState::Failed {
                    if let Some(pc) = pc.upgrade() {
                        dump_selected_pair(&pc, "FAILED").await;
                    }
                }
            })
        }));

        Ok(Arc::new(RtcTransport { pc }))
    }
}

pub struct RtcTransport {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), TransportError> {
        let rtp_track = Arc::new(TrackLocalStaticSample::new(
            codec_for(track.kind()),
            track.id().to_owned(),
            track.stream_id().to_owned(),
        ));
        let sender = self
            .pc
            .add_track(rtp_track as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // RTCP нужно вычитывать, иначе интерсепторы не работают
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        from_rtc_description(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        from_rtc_description(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        self.pc
            .set_local_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: NetworkCandidate) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        map_ice_state(self.pc.ice_connection_state())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_ice_counts_as_connected() {
        assert_eq!(
            map_ice_state(RTCIceConnectionState::Completed),
            ConnectionState::Connected
        );
        assert_eq!(
            map_ice_state(RTCIceConnectionState::Checking),
            ConnectionState::Checking
        );
    }

    #[test]
    fn config_carries_normalized_servers() {
        let config = rtc_config(&[ServerConfig::stun("s", "stun.l.google.com:19302")]);
        assert_eq!(
            config.ice_servers[0].urls,
            vec!["stun:stun.l.google.com:19302".to_string()]
        );
    }
}
