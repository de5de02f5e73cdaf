#![forbid(unsafe_code)]

fn main() {
    // Only compiler metadata is captured so builds also work from source
    // tarballs that are not git checkouts.
    build_data::set_RUSTC_VERSION();

    // Tells cargo not to rebuild build.rs during debug builds when other files change.
    // This speeds up development builds.
    //build_data::no_debug_rebuilds();
}
