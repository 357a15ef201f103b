//! Stack pane rendering
//!
//! Shows the words captured upwards from `rsp`. The row at `rsp` and the row
//! at `rbp` (the saved frame pointer) are marked.

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

/// Render the stack pane
pub fn render_stack_pane(
    frame: &mut Frame,
    area: Rect,
    current: Option<&Snapshot>,
    is_focused: bool,
    scroll: &mut usize,
) {
    let block = pane_block(" Stack ", is_focused);

    let Some(snapshot) = current else {
        render_scrolled_list(frame, area, block, vec![placeholder("(no snapshot)")], scroll);
        return;
    };

    let mut items: Vec<ListItem> = Vec::new();
    if snapshot.stack.is_empty() {
        items.push(placeholder("(unreadable)"));
    }

    for &(address, word) in &snapshot.stack {
        let marker = if address == snapshot.regs.rsp {
            "rsp ▸ "
        } else if address == snapshot.regs.rbp {
            "rbp ▸ "
        } else {
            "      "
        };
        let row_style = if address == snapshot.regs.rbp {
            Style::default().bg(DEFAULT_THEME.current_line_bg)
        } else {
            Style::default()
        };
        items.push(
            ListItem::new(Line::from(vec![
                Span::styled(
                    marker,
                    Style::default()
                        .fg(DEFAULT_THEME.secondary)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("0x{:X}", address),
                    Style::default().fg(DEFAULT_THEME.address),
                ),
                Span::styled("  ", Style::default()),
                Span::styled(
                    format!("{:016X}", word),
                    Style::default().fg(DEFAULT_THEME.value),
                ),
            ]))
            .style(row_style),
        );
    }

    render_scrolled_list(frame, area, block, items, scroll);
}
