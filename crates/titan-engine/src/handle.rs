//! Opaque engine handles.

use std::fmt;

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// A source, scene, group or transition.
    SourceId
);
handle!(
    /// A placement of a source inside a scene or group.
    ItemId
);
handle!(
    /// A volume meter.
    MeterId
);
handle!(
    /// A video or audio encoder.
    EncoderId
);
handle!(
    /// A streaming or recording output.
    OutputId
);
handle!(
    /// A GPU texture.
    TextureId
);
handle!(
    /// An off-screen render target.
    RenderTargetId
);
handle!(
    /// A registered render callback.
    RenderCallbackId
);
