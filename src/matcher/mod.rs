//! Greedy nearest-duration pairing of video-only and audio-only files.
//!
//! Every eligible (video, audio) combination is scored by absolute duration
//! difference, the candidates are sorted, and the sorted list is walked once,
//! accepting a candidate only if neither member is taken yet.
//!
//! Candidates are ordered by score, then by file-size difference, then by
//! video path and audio path. The order is total, so the result does not
//! depend on the order probe results arrive in.

use muxpair_core::{Pair, ProbeResult, StreamKind};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Output of one matcher pass.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Accepted pairs, ordered by video path.
    pub pairs: Vec<Pair>,
    /// Everything not in a pair, ordered by path.
    pub unmatched: Vec<Arc<ProbeResult>>,
}

/// Pairing policy.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// Largest accepted duration difference in seconds (inclusive).
    pub max_duration_diff: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            max_duration_diff: 5.0,
        }
    }
}

struct Candidate {
    video: usize,
    audio: usize,
    score: f64,
    size_diff: u64,
}

/// Pair video and audio probe results under `policy`.
///
/// Unknown kinds, probe failures, files without a usable duration and
/// anything left over after the greedy walk end up in
/// [`MatchResult::unmatched`]. No eligible pairs is an empty result, not an
/// error.
pub fn match_pairs(results: &[Arc<ProbeResult>], policy: &MatchPolicy) -> MatchResult {
    let mut videos = Vec::new();
    let mut audios = Vec::new();
    let mut unmatched = Vec::new();

    for r in results {
        match r.kind {
            StreamKind::Video => videos.push(Arc::clone(r)),
            StreamKind::Audio => audios.push(Arc::clone(r)),
            StreamKind::Unknown => unmatched.push(Arc::clone(r)),
        }
    }

    let mut candidates = Vec::new();
    for (vi, v) in videos.iter().enumerate() {
        let Some(dv) = v.usable_duration() else {
            continue;
        };
        for (ai, a) in audios.iter().enumerate() {
            let Some(da) = a.usable_duration() else {
                continue;
            };
            // Pairs never span two directories.
            if v.file.dir() != a.file.dir() {
                continue;
            }
            let score = (dv - da).abs();
            if score > policy.max_duration_diff {
                continue;
            }
            candidates.push(Candidate {
                video: vi,
                audio: ai,
                score,
                size_diff: v.file.size.abs_diff(a.file.size),
            });
        }
    }

    candidates.sort_by(|x, y| {
        x.score
            .total_cmp(&y.score)
            .then(x.size_diff.cmp(&y.size_diff))
            .then_with(|| videos[x.video].path().cmp(videos[y.video].path()))
            .then_with(|| audios[x.audio].path().cmp(audios[y.audio].path()))
    });

    let mut video_taken = vec![false; videos.len()];
    let mut audio_taken = vec![false; audios.len()];
    let mut pairs = Vec::new();

    for c in &candidates {
        if video_taken[c.video] || audio_taken[c.audio] {
            continue;
        }
        video_taken[c.video] = true;
        audio_taken[c.audio] = true;
        pairs.push(Pair {
            video: Arc::clone(&videos[c.video]),
            audio: Arc::clone(&audios[c.audio]),
            score: c.score,
        });
    }

    unmatched.extend(
        videos
            .iter()
            .zip(&video_taken)
            .chain(audios.iter().zip(&audio_taken))
            .filter(|(_, taken)| !**taken)
            .map(|(r, _)| Arc::clone(r)),
    );

    pairs.sort_by(|a, b| by_path(&a.video, &b.video));
    unmatched.sort_by(by_path);

    debug!(
        candidates = candidates.len(),
        pairs = pairs.len(),
        unmatched = unmatched.len(),
        "Matching complete"
    );

    MatchResult { pairs, unmatched }
}

fn by_path(a: &Arc<ProbeResult>, b: &Arc<ProbeResult>) -> Ordering {
    a.path().cmp(b.path())
}
