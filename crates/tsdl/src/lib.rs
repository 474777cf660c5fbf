//! Download the segments of an HLS playlist concurrently and merge them into one file.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Playlist   │   │  Scheduler   │   │ SegmentStore │   │ ConcatMerger │
//! │   Resolver   ├───►  [N tasks]   ├───►  000000.ts   ├───►  output.ts   │
//! │ master→media │   │ fetch+decode │   │  000001.ts   │   │ index order  │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//! ```

pub mod checkpoint;
pub mod codec;
pub mod download;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod merge;
pub mod progress;
pub mod store;
pub mod util;

pub use download::Downloader;
pub use error::{TsdlError, TsdlResult};
pub use fetch::Fetch;
pub use util::{http::HttpClient, range::ByteRange};
