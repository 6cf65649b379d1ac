fn main() {
    if let Err(e) = shadow_rs::ShadowBuilder::builder().build() {
        panic!("failed to generate build metadata: {e}");
    }
}
