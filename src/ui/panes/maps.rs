//! Memory mappings pane

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

/// Render the mappings pane; the mapping holding `rip` and the one holding
/// `rsp` are highlighted
pub fn render_maps_pane(
    frame: &mut Frame,
    area: Rect,
    current: Option<&Snapshot>,
    is_focused: bool,
    scroll: &mut usize,
) {
    let block = pane_block(" Mappings ", is_focused);

    let Some(snapshot) = current else {
        render_scrolled_list(frame, area, block, vec![placeholder("(no snapshot)")], scroll);
        return;
    };

    let code = snapshot.code_mapping();
    let items = snapshot
        .mappings
        .iter()
        .map(|mapping| {
            let (tag, tag_color) = if code.is_some_and(|c| std::ptr::eq(c, mapping)) {
                ("rip ", DEFAULT_THEME.success)
            } else if mapping.contains(snapshot.regs.rsp) {
                ("rsp ", DEFAULT_THEME.secondary)
            } else {
                ("    ", DEFAULT_THEME.comment)
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    tag,
                    Style::default().fg(tag_color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("{:012x}-{:012x} ", mapping.start, mapping.end),
                    Style::default().fg(DEFAULT_THEME.address),
                ),
                Span::styled(
                    format!("{} ", mapping.permissions),
                    Style::default().fg(DEFAULT_THEME.primary),
                ),
                Span::styled(
                    mapping.pathname.clone(),
                    Style::default().fg(DEFAULT_THEME.fg),
                ),
            ]))
        })
        .collect();

    render_scrolled_list(frame, area, block, items, scroll);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::maps::parse_mappings;
    use crate::trace::{Backtrace, Registers};
    use ratatui::{backend::TestBackend, Terminal};

    fn rendered_lines(snapshot: &Snapshot) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(80, 6)).unwrap();
        terminal
            .draw(|f| render_maps_pane(f, f.area(), Some(snapshot), false, &mut 0))
            .unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect()
    }

    #[test]
    fn test_code_and_stack_mappings_are_tagged() {
        let snapshot = Snapshot {
            step: 0,
            status: None,
            regs: Registers {
                rip: 0x1100,
                rsp: 0x7ff0,
                ..Registers::default()
            },
            backtrace: Backtrace::default(),
            stack: Vec::new(),
            mappings: parse_mappings(
                "1000-2000 r-xp 00000000 00:00 0 /bin/callchain\n\
                 3000-4000 rw-p 00000000 00:00 0 [heap]\n\
                 7000-8000 rw-p 00000000 00:00 0 [stack]\n",
            )
            .unwrap(),
        };

        let lines = rendered_lines(&snapshot);
        assert!(lines[1].contains("rip") && lines[1].contains("/bin/callchain"));
        assert!(!lines[2].contains("rip") && !lines[2].contains("rsp"));
        assert!(lines[3].contains("rsp") && lines[3].contains("[stack]"));
    }
}
