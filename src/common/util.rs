//! General utility functions

/// Join a list to form a string using a choice of separators
///
/// The items are joined with `sep1`, except for the last two items which are
/// joined with `sep2`. If `sep2` is `None` then all items are joined with
/// `sep1`. Useful for human-readable enumerations such as
/// `"nginx, lighttpd or apache"`.
///
/// # Arguments
///
/// * `items` - Items to join
/// * `sep1` - Separator for all but the final pair
/// * `sep2` - Separator for the final pair
pub fn list_join<T: ToString>(items: &[T], sep1: &str, sep2: Option<&str>) -> String {
    let sep2 = sep2.unwrap_or(sep1);
    let strs: Vec<String> = items.iter().map(|v| v.to_string()).collect();
    match strs.len() {
        0 => String::new(),
        1 => strs[0].clone(),
        n => {
            let head = &strs[..n - 2];
            let tail = format!("{}{}{}", strs[n - 2], sep2, strs[n - 1]);
            if head.is_empty() {
                tail
            } else {
                format!("{}{}{}", head.join(sep1), sep1, tail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_join() {
        assert_eq!(list_join(&[1, 2, 3, 4], ", ", Some(" or ")), "1, 2, 3 or 4");
        assert_eq!(list_join::<i32>(&[], ", ", Some(" or ")), "");
        assert_eq!(list_join(&[1], ", ", Some(" or ")), "1");
        assert_eq!(list_join(&[1, 2], ", ", Some(" or ")), "1 or 2");
        assert_eq!(list_join(&[1, 2, 3], ", ", Some(" or ")), "1, 2 or 3");
        assert_eq!(list_join(&[1, 2, 3], ", ", None), "1, 2, 3");
    }
}
