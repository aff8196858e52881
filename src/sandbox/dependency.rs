//! Missing-dependency detection for error outcomes

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MODULE_NOT_FOUND: Regex =
        Regex::new(r"ModuleNotFoundError: No module named '([^']+)'").expect("valid regex");
    static ref PACKAGE_NAME: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-\[\],=<>!~]*$").expect("valid regex");
}

/// Top-level module named by a `ModuleNotFoundError`, if the message is one
///
/// Only this exact phrasing is recognised; other import failures stay plain
/// error outcomes.
pub fn missing_module(message: &str) -> Option<&str> {
    let module = MODULE_NOT_FOUND.captures(message)?.get(1)?.as_str();
    module.split('.').next().filter(|m| !m.is_empty())
}

/// Whether `name` is safe to splice into a `pip install` line
pub fn is_valid_package_name(name: &str) -> bool {
    PACKAGE_NAME.is_match(name)
}

/// The message returned after installing a missing module
pub fn retry_hint(module: &str) -> String {
    format!("{} was missing but got installed now. Please try again.", module)
}

/// The error message when installing a missing module failed
pub fn install_failure(module: &str, error: &str) -> String {
    format!("{} is missing and could not be installed: {}", module, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_module() {
        assert_eq!(
            missing_module("ModuleNotFoundError: No module named 'nonexistent_pkg_xyz'"),
            Some("nonexistent_pkg_xyz")
        );
    }

    #[test]
    fn test_submodule_maps_to_top_level() {
        assert_eq!(
            missing_module("ModuleNotFoundError: No module named 'matplotlib.pyplot'"),
            Some("matplotlib")
        );
    }

    #[test]
    fn test_other_phrasings_are_ignored() {
        assert_eq!(missing_module("ImportError: cannot import name 'foo' from 'bar'"), None);
        assert_eq!(missing_module("NameError: name 'np' is not defined"), None);
    }

    #[test]
    fn test_package_names() {
        assert!(is_valid_package_name("pandas"));
        assert!(is_valid_package_name("scikit-learn==1.4.2"));
        assert!(is_valid_package_name("uvicorn[standard]"));
        assert!(!is_valid_package_name("pandas; rm -rf /"));
        assert!(!is_valid_package_name("$(whoami)"));
        assert!(!is_valid_package_name(""));
    }

    #[test]
    fn test_private_module_is_not_installable() {
        let module = missing_module("ModuleNotFoundError: No module named '_speedups'").unwrap();
        assert!(!is_valid_package_name(module));
    }

    #[test]
    fn test_retry_hint() {
        assert_eq!(
            retry_hint("nonexistent_pkg_xyz"),
            "nonexistent_pkg_xyz was missing but got installed now. Please try again."
        );
    }
}
