//! Backtrace pane rendering

use super::{pane_block, placeholder, render_scrolled_list};
use crate::snapshot::Snapshot;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::ListItem,
    Frame,
};

/// Render the backtrace pane, innermost frame first
pub fn render_backtrace_pane(
    frame: &mut Frame,
    area: Rect,
    current: Option<&Snapshot>,
    is_focused: bool,
    scroll: &mut usize,
) {
    let block = pane_block(" Backtrace ", is_focused);

    let Some(snapshot) = current else {
        render_scrolled_list(frame, area, block, vec![placeholder("(no snapshot)")], scroll);
        return;
    };

    let mut items: Vec<ListItem> = Vec::new();
    if snapshot.backtrace.frames.is_empty() {
        items.push(placeholder("(no frames)"));
    }

    for (depth, bt_frame) in snapshot.backtrace.frames.iter().enumerate() {
        let header = Line::from(vec![
            Span::styled("▸ ", Style::default().fg(DEFAULT_THEME.secondary)),
            Span::styled(
                format!("#{:<2} ", depth),
                Style::default().fg(DEFAULT_THEME.comment),
            ),
            Span::styled(
                format!("0x{:X}", bt_frame.ip),
                Style::default().fg(DEFAULT_THEME.address),
            ),
            Span::styled(" │ ", Style::default().fg(DEFAULT_THEME.comment)),
            Span::styled(
                bt_frame.name().to_string(),
                Style::default()
                    .fg(DEFAULT_THEME.function)
                    .add_modifier(Modifier::BOLD),
            ),
        ]);
        items.push(ListItem::new(header));

        if !bt_frame.arguments.is_empty() {
            let args = bt_frame
                .arguments
                .iter()
                .map(|arg| format!("0x{:X}", arg))
                .collect::<Vec<_>>()
                .join(", ");
            items.push(ListItem::new(Line::from(vec![
                Span::styled("    args ", Style::default().fg(DEFAULT_THEME.comment)),
                Span::styled(args, Style::default().fg(DEFAULT_THEME.value)),
            ])));
        }
    }

    if snapshot.backtrace.truncated {
        items.push(placeholder("    ..."));
    }

    render_scrolled_list(frame, area, block, items, scroll);
}
