//! Test fixtures - sample recipes for testing.

#![allow(dead_code)]

/// LLVM with clang unpacked into its tools directory.
pub const LLVM_RECIPE: &str = include_str!("../../recipes/llvm.recipe");

/// memcached with a nested libevent installed into memcached's tree.
pub const MEMCACHED_RECIPE: &str = include_str!("../../recipes/memcached.recipe");

/// Flat recipe with configure and make outside any unpack.
pub const NO_UNPACK_RECIPE: &str = r#"
(recipe "bare" "1.0"
  (configure "--prefix=${prefix}")
  (make))
"#;

/// Three sibling steps, used to check that a failure stops the rest.
pub const THREE_STEP_RECIPE: &str = r#"
(recipe "three" "0.1"
  (unpack "http://example.com/three-${version}.tar.gz"
    (configure "--step=1")
    (make "all")
    (make "install")))
"#;

/// Deeply nested unpacks.
pub const DEEP_RECIPE: &str = r#"
(recipe "deep" "3"
  (unpack "http://example.com/a-${version}.tar.gz"
    (unpack "http://example.com/b-${version}.tar.gz" (as "b")
      (unpack "http://example.com/c-${version}.tar.gz" (as "c")
        (configure "--where=${pwd}")
        (make "fail")))
    (make "never")))
"#;

/// Configure flag referencing an undefined variable.
pub const UNKNOWN_VAR_RECIPE: &str = r#"
(recipe "typo" "1.0"
  (unpack "http://example.com/typo-${version}.tar.gz"
    (configure "--prefix=${prefx}")
    (make)))
"#;
