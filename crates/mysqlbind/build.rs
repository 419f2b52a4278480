//! Link libmysqlclient when the `native` feature is enabled.
//!
//! `MYSQLCLIENT_LIB_DIR` adds a library search path and `MYSQLCLIENT_LIB`
//! overrides the library name (e.g. `mariadb` for MariaDB Connector/C).

#[cfg(feature = "native")]
fn main() {
    println!("cargo:rerun-if-env-changed=MYSQLCLIENT_LIB_DIR");
    println!("cargo:rerun-if-env-changed=MYSQLCLIENT_LIB");

    if let Ok(dir) = std::env::var("MYSQLCLIENT_LIB_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
    }
    let lib = std::env::var("MYSQLCLIENT_LIB").unwrap_or_else(|_| "mysqlclient".to_string());
    println!("cargo:rustc-link-lib=dylib={lib}");
}

#[cfg(not(feature = "native"))]
fn main() {
    // Nothing to link: the marshaling layer is pure Rust
}
