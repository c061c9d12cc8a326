//! Parameter Sets

#![allow(dead_code)]

use crate::base::Float;
use std::collections::HashMap;

/// Generates the `add_*`, `find_*` and `find_one_*` accessors for one value
/// type stored in a `ParamSet`.
macro_rules! paramset_accessors {
    ($t: ty, $map: ident, $add: ident, $find: ident, $find_one: ident) => {
        /// Store values for a named parameter, replacing any previous values.
        ///
        /// * `name`   - Parameter name.
        /// * `values` - Parameter values.
        pub fn $add(&mut self, name: &str, values: &[$t]) {
            self.$map.insert(String::from(name), values.to_vec());
        }

        /// Returns all values of a named parameter, empty if absent.
        ///
        /// * `name` - Parameter name.
        pub fn $find(&self, name: &str) -> Vec<$t> {
            self.$map.get(name).cloned().unwrap_or_default()
        }

        /// Returns the first value of a named parameter or a default.
        ///
        /// * `name`    - Parameter name.
        /// * `default` - Default value.
        pub fn $find_one(&self, name: &str, default: $t) -> $t {
            self.$map
                .get(name)
                .and_then(|v| v.first().cloned())
                .unwrap_or(default)
        }
    };
}

/// A typed key/value property set used to configure integrators and caches.
#[derive(Clone, Debug, Default)]
pub struct ParamSet {
    bools: HashMap<String, Vec<bool>>,
    ints: HashMap<String, Vec<i32>>,
    floats: HashMap<String, Vec<Float>>,
    strings: HashMap<String, Vec<String>>,
}

impl ParamSet {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a parameter with the given name exists in any of the
    /// typed maps.
    ///
    /// * `name` - Parameter name.
    pub fn is_defined(&self, name: &str) -> bool {
        self.bools.contains_key(name)
            || self.ints.contains_key(name)
            || self.floats.contains_key(name)
            || self.strings.contains_key(name)
    }

    paramset_accessors!(bool, bools, add_bool, find_bool, find_one_bool);
    paramset_accessors!(i32, ints, add_int, find_int, find_one_int);
    paramset_accessors!(Float, floats, add_float, find_float, find_one_float);
    paramset_accessors!(String, strings, add_string, find_string, find_one_string);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let params = ParamSet::new();
        assert_eq!(params.find_one_int("path.pathdepth.total", 6), 6);
        assert!(!params.is_defined("path.pathdepth.total"));
    }

    #[test]
    fn stored_values_shadow_defaults() {
        let mut params = ParamSet::new();
        params.add_float("path.russianroulette.cap", &[0.25]);
        params.add_string("file", &[String::from("cache.bin")]);
        assert_eq!(params.find_one_float("path.russianroulette.cap", 0.5), 0.25);
        assert_eq!(params.find_one_string("file", String::new()), "cache.bin");
        assert!(params.is_defined("file"));
    }
}
