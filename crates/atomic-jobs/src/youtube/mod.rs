//! YouTube audio ingestion.

pub mod chunked;
pub mod ingest;
pub mod source;

pub use chunked::{merge_chunks, AudioSplitter, ChunkedTranscriber, FfmpegSplitter};
pub use ingest::YoutubeIngestHandler;
pub use source::{extract_video_id, parse_ytdlp_output, AudioSource, VideoInfo, YtDlpSource};
