//! Fixed-size paged storage: the `Page` buffer, the page-0 `Header`,
//! the allocation `Bitmap`, and the file-backed `DiskPageIo`.

mod bitmap;
mod disk;
mod header;
mod page;
mod page_io;

pub use bitmap::{Bitmap, BitmapLayout};
pub use disk::DiskPageIo;
pub use header::{Header, MAGIC};
pub use page::Page;
pub use page_io::PageIo;
