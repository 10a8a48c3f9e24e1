/**
 * Stack normalization - textual trace parsing and native conversion.
 *
 * - `parser` - the three-grammar line parser and blob-URL rewrite
 * - `blob` - the injectable synchronous source fetcher
 * - `native` - `backtrace::Backtrace` to `Frame` conversion
 */

pub mod blob;
pub mod native;
pub mod parser;

pub use blob::{BlobFetcher, UreqFetcher};
pub use native::native_frames;
pub use parser::Normalizer;
