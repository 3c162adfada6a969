//! Generated protobuf modules
//!
//! `build.rs` compiles `protos/meshtastic/*.proto`; prost emits one file per package
//! (`meshtastic.rs`) which is included here.

pub mod meshtastic_generated {
    //! Generated Meshtastic types (`ServiceEnvelope`, `MeshPacket`, `Data`, `PortNum`, `ToRadio`).
    #[allow(dead_code, unused_imports, unused_variables, unused_mut, unused_macros)]
    #[allow(clippy::all)]
    #[allow(rustdoc::invalid_html_tags)]
    mod inner {
        include!(concat!(env!("OUT_DIR"), "/meshtastic.rs"));
    }
    pub use inner::*;
}
