// Links every built-in service module so its `inventory` registration is
// visible to the registry. Add new modules here and to Cargo.toml.
#![allow(unused_imports)]

use linear_service as _;
