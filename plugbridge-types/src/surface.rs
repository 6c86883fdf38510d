//! Surfaces and the closed event vocabulary each one accepts.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two execution contexts a plugin can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    /// Authoring time.
    Editor,
    /// Presentation time.
    Player,
}

impl Surface {
    pub const ALL: [Surface; 2] = [Surface::Editor, Surface::Player];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Editor => "editor",
            Self::Player => "player",
        }
    }

    /// The event kinds plugins may register for on this surface.
    pub fn event_kinds(&self) -> &'static [EventKind] {
        match self {
            Self::Editor => &[
                EventKind::PanelRegistered,
                EventKind::PanelMessage,
                EventKind::BlockRender,
                EventKind::BlockMessage,
                EventKind::BlockPropertyChange,
            ],
            Self::Player => &[
                EventKind::BlockRender,
                EventKind::BlockMessage,
                EventKind::RemoteMessage,
            ],
        }
    }

    pub fn allows(&self, kind: EventKind) -> bool {
        self.event_kinds().contains(&kind)
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surface {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "editor" => Ok(Self::Editor),
            "player" => Ok(Self::Player),
            other => Err(Error::UnknownSurface(other.to_string())),
        }
    }
}

/// A host occurrence a plugin may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    PanelRegistered,
    PanelMessage,
    BlockRender,
    BlockMessage,
    BlockPropertyChange,
    RemoteMessage,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PanelRegistered => "panel-registered",
            Self::PanelMessage => "panel-message",
            Self::BlockRender => "block-render",
            Self::BlockMessage => "block-message",
            Self::BlockPropertyChange => "block-property-change",
            Self::RemoteMessage => "remote-message",
        }
    }

    /// Resolves a plugin-supplied name against one surface's vocabulary.
    pub fn resolve(surface: Surface, name: &str) -> Result<Self, Error> {
        let kind: EventKind = name.parse()?;
        if surface.allows(kind) {
            Ok(kind)
        } else {
            Err(Error::EventKindNotOnSurface {
                kind: name.to_string(),
                surface,
            })
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "panel-registered" => Ok(Self::PanelRegistered),
            "panel-message" => Ok(Self::PanelMessage),
            "block-render" => Ok(Self::BlockRender),
            "block-message" => Ok(Self::BlockMessage),
            "block-property-change" => Ok(Self::BlockPropertyChange),
            "remote-message" => Ok(Self::RemoteMessage),
            other => Err(Error::UnknownEventKind(other.to_string())),
        }
    }
}
