//! One conversion function per media family.

mod ffmpeg;

pub mod audio;
pub mod document;
pub mod image;
pub mod raw;
pub mod video;

pub use self::audio::convert_audio;
pub use self::document::convert_document;
pub use self::image::convert_image;
pub use self::raw::convert_raw;
pub use self::video::convert_video;
