//! HTML rewrites for articles headed into the WeChat Official Account editor.
//!
//! Every transform takes the whole document as a string and returns the
//! rewritten string. They are regex based and best-effort: markup a pattern
//! does not recognise is passed through unchanged, and none of them fail.

pub mod code_blocks;
pub mod cover;
pub mod editor_fix;
pub mod spacing;
pub mod style_fix;

pub use code_blocks::convert_code_blocks;
pub use cover::remove_cover_image;
pub use editor_fix::{fix_editor_issues, EditorFix};
pub use spacing::optimize_spacing;
pub use style_fix::fix_wechat_style;
