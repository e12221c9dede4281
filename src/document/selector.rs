//! Cell selection by index or label.

use super::CodeCell;
use crate::error::QkernelError;
use crate::Result;

/// Split a comma-separated selector list, dropping empty entries.
pub fn parse_selector_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Pick cells in selector order.
///
/// A selector made only of digits is a 0-based cell index; anything else
/// is a label. Repeating a selector runs the cell again.
pub fn select_cells<S: AsRef<str>>(cells: &[CodeCell], selectors: &[S]) -> Result<Vec<CodeCell>> {
    selectors
        .iter()
        .map(|selector| {
            let selector = selector.as_ref();
            find(cells, selector)
                .cloned()
                .ok_or_else(|| QkernelError::InvalidSelector(describe_miss(cells, selector)))
        })
        .collect()
}

fn find<'a>(cells: &'a [CodeCell], selector: &str) -> Option<&'a CodeCell> {
    match selector.parse::<usize>() {
        Ok(index) if selector.bytes().all(|b| b.is_ascii_digit()) => cells.get(index),
        _ => cells.iter().find(|c| c.label.as_deref() == Some(selector)),
    }
}

fn describe_miss(cells: &[CodeCell], selector: &str) -> String {
    if selector.bytes().all(|b| b.is_ascii_digit()) {
        format!(
            "cell index {selector} out of range (document has {} cells)",
            cells.len()
        )
    } else {
        let labels: Vec<&str> = cells.iter().filter_map(|c| c.label.as_deref()).collect();
        if labels.is_empty() {
            format!("no cell labeled '{selector}' (document has no labels)")
        } else {
            format!("no cell labeled '{selector}' (labels: {})", labels.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(index: usize, label: Option<&str>) -> CodeCell {
        CodeCell {
            index,
            label: label.map(String::from),
            language: "python".into(),
            source: format!("print({index})"),
            line: index * 4 + 1,
        }
    }

    fn cells() -> Vec<CodeCell> {
        vec![cell(0, Some("setup")), cell(1, None), cell(2, Some("plot"))]
    }

    #[test]
    fn test_parse_selector_list() {
        assert_eq!(parse_selector_list("0, setup,,2 "), vec!["0", "setup", "2"]);
        assert!(parse_selector_list(" , ").is_empty());
    }

    #[test]
    fn test_mixed_selectors_keep_order() {
        let picked = select_cells(&cells(), &["plot", "0", "1"]).unwrap();
        let indices: Vec<usize> = picked.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![2, 0, 1]);
    }

    #[test]
    fn test_repeated_selector() {
        let picked = select_cells(&cells(), &["setup", "setup"]).unwrap();
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_index_out_of_range() {
        let err = select_cells(&cells(), &["7"]).unwrap_err();
        match err {
            QkernelError::InvalidSelector(msg) => assert!(msg.contains("out of range")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_label_lists_known_labels() {
        let err = select_cells(&cells(), &["setup", "missing"]).unwrap_err();
        match err {
            QkernelError::InvalidSelector(msg) => {
                assert!(msg.contains("missing"));
                assert!(msg.contains("setup, plot"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_signed_number_is_a_label() {
        let mut cells = cells();
        cells[1].label = Some("+1".into());
        let picked = select_cells(&cells, &["+1"]).unwrap();
        assert_eq!(picked[0].index, 1);
    }

    #[test]
    fn test_empty_selection() {
        let picked = select_cells::<&str>(&cells(), &[]).unwrap();
        assert!(picked.is_empty());
    }
}
