use rolecall_core::{
    CreatedMenu, MenuRender, MenuSummary, ReconcileReport, RemovalReport, ValidationError,
};
use serde::Serialize;

pub const INFO_COLOR: u32 = 0x3B82F6;
pub const ERROR_COLOR: u32 = 0xDC2626;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub color: u32,
}

/// Body of a `POST /channels/{id}/messages` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), embeds: Vec::new() }
    }

    pub fn embed(embed: Embed) -> Self {
        Self { content: None, embeds: vec![embed] }
    }

    /// Everything a reader would see, for logs and assertions.
    pub fn plain_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(content) = &self.content {
            parts.push(content.clone());
        }
        for embed in &self.embeds {
            if let Some(title) = &embed.title {
                parts.push(title.clone());
            }
            if !embed.description.is_empty() {
                parts.push(embed.description.clone());
            }
        }
        parts.join("\n")
    }
}

pub fn menu_message(render: &MenuRender) -> OutgoingMessage {
    OutgoingMessage::embed(Embed {
        title: Some(render.title.clone()),
        description: render.description(),
        color: render.color,
    })
}

pub fn created_message(created: &CreatedMenu) -> OutgoingMessage {
    let mut description = format!(
        "Role menu `{}` is live with {} role(s).",
        created.key,
        created.bindings.len()
    );
    if !created.collapsed_symbols.is_empty() {
        let repeated =
            created.collapsed_symbols.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        description.push_str(&format!(
            "\nThese emojis were given more than once and keep only their last role: {repeated}"
        ));
    }

    OutgoingMessage::embed(Embed {
        title: Some(format!("Created {}", created.title)),
        description,
        color: INFO_COLOR,
    })
}

pub fn removal_message(report: &RemovalReport) -> OutgoingMessage {
    let content = match &report.remote_error {
        None => format!(
            "Role menu with the id of `{}` has been successfully deleted.",
            report.key
        ),
        Some(_) => report.summary(),
    };
    OutgoingMessage::text(content)
}

pub fn list_message(menus: &[MenuSummary]) -> OutgoingMessage {
    if menus.is_empty() {
        return OutgoingMessage::embed(Embed {
            title: Some("Role menus".to_owned()),
            description: "No role menus are saved yet.".to_owned(),
            color: INFO_COLOR,
        });
    }

    let lines = menus
        .iter()
        .map(|menu| {
            let state = if menu.live { "live" } else { "not loaded" };
            format!("`{}` {} role(s), {state}", menu.key, menu.binding_count())
        })
        .collect::<Vec<_>>();

    OutgoingMessage::embed(Embed {
        title: Some("Role menus".to_owned()),
        description: lines.join("\n"),
        color: INFO_COLOR,
    })
}

pub fn reload_message(report: &ReconcileReport) -> OutgoingMessage {
    let mut lines =
        vec![format!("{} of {} saved role menu(s) are live.", report.loaded, report.persisted)];
    lines.extend(report.failures.iter().map(|failure| format!("`{failure}`")));

    OutgoingMessage::embed(Embed {
        title: Some("Role menus reloaded".to_owned()),
        description: lines.join("\n"),
        color: if report.failures.is_empty() { INFO_COLOR } else { ERROR_COLOR },
    })
}

pub fn help_message(prefix: &str) -> OutgoingMessage {
    let description = [
        format!("`{prefix}rr add <title> <@role...> <emoji...>` post a new role menu"),
        format!("`{prefix}rr remove <channelId>-<messageId>` delete a role menu"),
        format!("`{prefix}rr list` show saved role menus"),
        format!("`{prefix}rr reload` re-read saved role menus and check them again"),
        "Use `_` in the title for spaces. Give one emoji per role, in the same order.".to_owned(),
    ]
    .join("\n");

    OutgoingMessage::embed(Embed {
        title: Some("Reaction role menus".to_owned()),
        description,
        color: INFO_COLOR,
    })
}

/// The count mismatch reply keeps the exact layout operators already know.
pub fn validation_message(error: &ValidationError) -> OutgoingMessage {
    match error {
        ValidationError::CountMismatch { roles, symbols } => OutgoingMessage::text(format!(
            "The number of roles is not the same as the number of emojis, please try again.\n`Role  Count: {roles}`\n`Emoji Count: {symbols}`"
        )),
        other => error_message(&format!("{other}, please try again.")),
    }
}

pub fn error_message(text: &str) -> OutgoingMessage {
    OutgoingMessage::embed(Embed { title: None, description: text.to_owned(), color: ERROR_COLOR })
}
