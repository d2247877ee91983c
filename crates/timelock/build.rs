use rustc_version::{version_meta, Channel};

// Lets rustdoc label feature-gated items when built on nightly.
fn main() {
    let nightly = version_meta().map_or(false, |meta| meta.channel == Channel::Nightly);
    if nightly {
        println!("cargo:rustc-cfg=CHANNEL_NIGHTLY");
    }
}
