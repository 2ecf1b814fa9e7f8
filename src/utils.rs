// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod cancel;
pub mod limits;
pub mod path;

use crate::Rc;

/// Dotted form of a document path below `data`, e.g. `data.authz.allow`.
pub fn get_path_string(path: &[Rc<str>]) -> String {
    let mut s = String::from("data");
    for p in path {
        s.push('.');
        s.push_str(p);
    }
    s
}
