fn main() {
    // Shown by `serial-bridge --version`
    let built = chrono::Utc::now().format("%Y-%m-%d").to_string();
    println!("cargo:rustc-env=BUILD_DATE={built}");
}
