//! Utility functions.
use lazy_static::lazy_static;

lazy_static! {
    /// Return the number of cpus as a String
    pub static ref NUM_CPU: String = num_cpus::get().to_string();
}

pub mod built_info {
    use lazy_static::lazy_static;
    include!(concat!(env!("OUT_DIR"), "/built.rs"));

    /// Get a software version string including
    ///   - Git commit hash
    ///   - Git dirty info (whether the repo had uncommitted changes)
    ///   - Cargo package version if no git info found
    fn get_software_version() -> String {
        let prefix = if let Some(s) = GIT_COMMIT_HASH {
            format!("{}-{}", PKG_VERSION, s[0..8].to_owned())
        } else {
            PKG_VERSION.to_string()
        };
        let suffix = match GIT_DIRTY {
            Some(true) => "-dirty",
            _ => "",
        };
        format!("{}{}", prefix, suffix)
    }

    lazy_static! {
        /// Version of the software with git hash
        pub static ref VERSION: String = get_software_version();
    }
}

/// A `MultiZip` object allows for zipping over N items.
///
/// For example, if you have a `Vec` of length 10 of `Vec`s this will pull one item from
/// each of the 10 inner vecs and return a `Vec` of length 10 with those items.
///
/// This will stop iteration as soon as the first of the inner vecs runs out of items.
pub struct MultiZip<T>(Vec<T>);

impl<T> MultiZip<T> {
    /// Create a new [`MultiZip`] iterator over a `Vec` of items.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self(items)
    }
}

impl<T> Iterator for MultiZip<T>
where
    T: Iterator,
{
    type Item = Vec<T::Item>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            return None;
        }
        self.0.iter_mut().map(Iterator::next).collect()
    }
}


#[cfg(test)]
mod test {
    use std::{iter::IntoIterator, vec::IntoIter};

    use super::MultiZip;

    #[test]
    fn test_multizip_equal() {
        let input = vec![vec![1; 10], vec![1; 10], vec![1; 10], vec![1; 10]];
        let multi: MultiZip<IntoIter<i32>> =
            MultiZip::new(input.into_iter().map(IntoIterator::into_iter).collect());
        let sum = multi.map(|zipped| zipped.into_iter().sum::<i32>()).sum::<i32>();
        assert_eq!(40, sum);
    }

    #[test]
    fn test_multizip_unequal() {
        let input = vec![vec![1; 10], vec![1; 8], vec![1; 10], vec![1; 10]];
        let multi: MultiZip<IntoIter<i32>> =
            MultiZip::new(input.into_iter().map(IntoIterator::into_iter).collect());
        let sum = multi.map(|zipped| zipped.into_iter().sum::<i32>()).sum::<i32>();
        assert_eq!(32, sum);
    }

    #[test]
    fn test_multizip_no_iterators() {
        let mut multi: MultiZip<IntoIter<i32>> = MultiZip::new(vec![]);
        assert!(multi.next().is_none());
    }
}
