//! Screen-area recognition collaborator.

use async_trait::async_trait;

use crate::{Category, Screenshot};

/// Result of trying to locate an area on screen and click it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Clicked,
    NotFound,
    ClickFailed,
    /// No template is configured for the requested screen/area pair.
    AreaUnconfigured,
}

impl ClickOutcome {
    /// Category an outcome helper reports for this click result.
    pub fn category(self) -> Category {
        match self {
            Self::Clicked => Category::Success,
            Self::NotFound | Self::ClickFailed => Category::Retry,
            Self::AreaUnconfigured => Category::Fail,
        }
    }
}

/// Result of looking for an area without clicking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaPresence {
    Present,
    Absent,
    Unconfigured,
}

impl AreaPresence {
    pub fn category(self) -> Category {
        match self {
            Self::Present => Category::Success,
            Self::Absent => Category::Retry,
            Self::Unconfigured => Category::Fail,
        }
    }
}

/// Finds named areas of named screens in a captured frame.
#[async_trait]
pub trait AreaLocator: Send + Sync {
    async fn find_and_click_area(
        &self,
        screen: &Screenshot,
        screen_name: &str,
        area_name: &str,
    ) -> ClickOutcome;

    async fn find_area(&self, screen: &Screenshot, screen_name: &str, area_name: &str)
        -> AreaPresence;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_results_map_to_categories() {
        assert_eq!(ClickOutcome::Clicked.category(), Category::Success);
        assert_eq!(ClickOutcome::NotFound.category(), Category::Retry);
        assert_eq!(ClickOutcome::ClickFailed.category(), Category::Retry);
        assert_eq!(ClickOutcome::AreaUnconfigured.category(), Category::Fail);
    }
}
