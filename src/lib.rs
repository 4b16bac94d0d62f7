pub mod prelude {
    #[cfg(feature = "vendor")] pub use vendor::prelude::*;
    #[cfg(feature = "routing")] pub use routing::prelude::*;
}

#[cfg(feature = "routing")] pub use routing::{self, builder, descriptor, dispatch, error, strategy};
