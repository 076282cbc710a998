use lenscast_core::StreamId;
use std::sync::Arc;
use webrtc::track::track_local::TrackLocal;

pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

/// The local capture, acquired outside this crate and attached to every
/// outgoing connection. Clones share the same tracks, so stopping the
/// capture stops it for every coordinator at once.
#[derive(Clone)]
pub struct MediaStream {
    id: StreamId,
    tracks: Arc<Vec<LocalTrack>>,
}

impl MediaStream {
    pub fn new(id: StreamId, tracks: Vec<LocalTrack>) -> Self {
        Self {
            id,
            tracks: Arc::new(tracks),
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}
