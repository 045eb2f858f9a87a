mod keys;
mod maker;
mod resource;
mod store;

pub use keys::{CacheKey, CopyKey, CopyParams, FilterMode, TextureKey, UniqueKey, WrapMode};
pub use maker::{BitmapTextureMaker, Cached, GenerationPolicy};
pub use resource::{Fit, MipStatus, TextureDesc, TextureOrigin, TextureProxy};
pub use store::TextureStore;
