//! Register pane: one row per register, values that changed since the
//! previous snapshot are highlighted

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

/// Render the register pane
pub fn render_registers_pane(
    frame: &mut Frame,
    area: Rect,
    current: Option<&Snapshot>,
    previous: Option<&Snapshot>,
    is_focused: bool,
    scroll: &mut usize,
) {
    let block = pane_block(" Registers ", is_focused);

    let Some(snapshot) = current else {
        render_scrolled_list(frame, area, block, vec![placeholder("(no snapshot)")], scroll);
        return;
    };

    let items = snapshot
        .regs
        .iter()
        .map(|(name, value)| {
            let changed = previous
                .and_then(|prev| prev.regs.get(name))
                .is_some_and(|old| old != value);
            let value_style = if changed {
                Style::default()
                    .fg(DEFAULT_THEME.changed)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(DEFAULT_THEME.value)
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<8}", name),
                    Style::default().fg(DEFAULT_THEME.primary),
                ),
                Span::styled(" = ", Style::default().fg(DEFAULT_THEME.comment)),
                Span::styled(format!("0x{:016X}", value), value_style),
            ]))
        })
        .collect();

    render_scrolled_list(frame, area, block, items, scroll);
}
