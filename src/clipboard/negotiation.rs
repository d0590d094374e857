//! Capability exchange and format list handling.

use clipsync_cliprdr::{Capabilities, CliprdrError, CliprdrResult, FormatList, GeneralCapabilityFlag, ResponseStatus};
use clipsync_core::{
    local_type_for_remote, local_type_for_remote_name, ClipboardFormat, LocalType, CF_TEXTURILIST,
    FORMAT_NAME_FILE_CONTENTS, FORMAT_NAME_FILE_GROUP_DESCRIPTOR, FORMAT_NAME_PREFERRED_DROP_EFFECT,
};
use tracing::{debug, info, warn};

use super::client::ClientInner;
use super::session::NegotiatedFormats;
use super::ui::{PasteFilesStatus, RemoteTarget, UiJob};

/// Local targets and file pseudo-formats extracted from a remote format list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RemoteOffer {
    pub(crate) targets: Vec<RemoteTarget>,
    pub(crate) formats: NegotiatedFormats,
}

/// Build the format list announcing the local targets.
///
/// Unknown targets are left out and each format is announced once. A URI
/// list is announced under the FileGroupDescriptorW name.
pub(crate) fn local_format_list(targets: &[String]) -> FormatList {
    let mut formats: Vec<ClipboardFormat> = Vec::new();
    for target in targets {
        let Some(id) = LocalType::from_target(target).and_then(LocalType::remote_format) else {
            continue;
        };
        if formats.iter().any(|format| format.id == id) {
            continue;
        }
        formats.push(if id == CF_TEXTURILIST {
            ClipboardFormat::with_name(id, FORMAT_NAME_FILE_GROUP_DESCRIPTOR)
        } else {
            ClipboardFormat::new(id)
        });
    }
    FormatList::new(formats)
}

/// Map a remote format list onto local targets
pub(crate) fn parse_remote_format_list(list: &FormatList) -> RemoteOffer {
    let mut offer = RemoteOffer::default();

    for format in &list.formats {
        match format.name.as_deref() {
            Some(FORMAT_NAME_FILE_GROUP_DESCRIPTOR) => {
                offer.formats.file_group_descriptor = Some(format.id);
                continue;
            }
            Some(FORMAT_NAME_FILE_CONTENTS) => {
                offer.formats.file_contents = Some(format.id);
                continue;
            }
            Some(FORMAT_NAME_PREFERRED_DROP_EFFECT) => {
                offer.formats.preferred_drop_effect = Some(format.id);
                continue;
            }
            _ => {}
        }

        let local = local_type_for_remote(format.id)
            .or_else(|| format.name.as_deref().and_then(local_type_for_remote_name));
        match local {
            // a bare URI list carries no file data; files arrive through the pseudo-formats
            Some(LocalType::UriList | LocalType::CopiedFiles) | None => {}
            Some(local) => {
                if !offer.targets.iter().any(|target| target.local == local) {
                    offer.targets.push(RemoteTarget {
                        local,
                        format_id: format.id,
                    });
                }
            }
        }
    }

    if let Some(descriptor) = offer.formats.file_formats().map(|files| files.descriptor) {
        offer.targets.push(RemoteTarget {
            local: LocalType::CopiedFiles,
            format_id: descriptor,
        });
    }

    offer
}

impl ClientInner {
    pub(crate) fn handle_monitor_ready(&self) -> CliprdrResult<()> {
        info!(parent: &self.span, "Clipboard channel ready");
        self.transport.send_capabilities(Capabilities::client())?;

        let targets = self
            .ui
            .call(|reply| UiJob::CollectTargets { reply })
            .map_err(|err| CliprdrError::Rejected(err.to_string()))?;
        let list = local_format_list(&targets);
        debug!(parent: &self.span, formats = list.formats.len(), "Sending initial format list");
        self.transport.send_format_list(list)?;

        self.session.mark_ready();
        Ok(())
    }

    pub(crate) fn handle_capabilities(&self, capabilities: &Capabilities) {
        let streaming = capabilities
            .general_flags()
            .is_some_and(|flags| flags.contains(GeneralCapabilityFlag::StreamFileclipEnabled));
        debug!(parent: &self.span, streaming, "Remote capabilities received");
        self.session.set_remote_streaming(streaming);
    }

    pub(crate) fn handle_format_list(&self, list: &FormatList) -> CliprdrResult<()> {
        debug!(parent: &self.span, formats = list.formats.len(), "Remote format list received");
        self.session.clear_remote_offer();
        self.abort_transfer_and_wait();

        let offer = parse_remote_format_list(list);
        let files_available = offer.formats.files_available();
        self.session.install_remote_offer(offer.formats, offer.targets.clone());

        let installed = self.ui.call(|reply| UiJob::OfferRemoteTargets {
            targets: offer.targets,
            reply,
        });

        self.status.pastefiles_status(if files_available {
            PasteFilesStatus::Ready
        } else {
            PasteFilesStatus::NoFiles
        });

        let status = match installed {
            Ok(()) => ResponseStatus::Ok,
            Err(err) => {
                warn!(parent: &self.span, error = %err, "Could not offer remote formats locally");
                ResponseStatus::Fail
            }
        };
        self.transport.send_format_list_response(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipsync_core::{CF_DIB, CF_HTML, CF_TEXT, CF_UNICODETEXT};

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_local_format_list_maps_and_dedupes() {
        let list = local_format_list(&targets(&[
            "TARGETS",
            "UTF8_STRING",
            "text/plain;charset=utf-8",
            "TEXT",
            "image/bmp",
            "application/x-unknown",
        ]));
        let ids: Vec<u32> = list.formats.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![CF_UNICODETEXT, CF_TEXT, CF_DIB]);
        assert!(list.formats.iter().all(|f| f.name.is_none()));
    }

    #[test]
    fn test_uri_list_announced_as_file_group_descriptor() {
        let list = local_format_list(&targets(&["text/uri-list"]));
        assert_eq!(
            list.formats,
            vec![ClipboardFormat::with_name(CF_TEXTURILIST, FORMAT_NAME_FILE_GROUP_DESCRIPTOR)]
        );
    }

    #[test]
    fn test_parse_remote_list_with_files() {
        let list = FormatList::new(vec![
            ClipboardFormat::new(CF_UNICODETEXT),
            ClipboardFormat::with_name(0xC00E, "HTML Format"),
            ClipboardFormat::with_name(0xC0A1, FORMAT_NAME_FILE_GROUP_DESCRIPTOR),
            ClipboardFormat::with_name(0xC0A2, FORMAT_NAME_FILE_CONTENTS),
            ClipboardFormat::with_name(0xC0A3, FORMAT_NAME_PREFERRED_DROP_EFFECT),
            ClipboardFormat::new(0xBEEF),
        ]);
        let offer = parse_remote_format_list(&list);

        assert!(offer.formats.files_available());
        assert_eq!(
            offer.targets,
            vec![
                RemoteTarget {
                    local: LocalType::Utf8Text,
                    format_id: CF_UNICODETEXT
                },
                RemoteTarget {
                    local: LocalType::Html,
                    format_id: 0xC00E
                },
                RemoteTarget {
                    local: LocalType::CopiedFiles,
                    format_id: 0xC0A1
                },
            ]
        );
    }

    #[test]
    fn test_missing_file_contents_means_no_files() {
        let list = FormatList::new(vec![
            ClipboardFormat::with_name(0xC0A1, FORMAT_NAME_FILE_GROUP_DESCRIPTOR),
            ClipboardFormat::with_name(0xC0A3, FORMAT_NAME_PREFERRED_DROP_EFFECT),
        ]);
        let offer = parse_remote_format_list(&list);
        assert!(!offer.formats.files_available());
        assert!(offer.targets.is_empty());
    }

    #[test]
    fn test_static_html_id_and_dibv5() {
        let list = FormatList::new(vec![ClipboardFormat::new(CF_HTML), ClipboardFormat::new(17)]);
        let offer = parse_remote_format_list(&list);
        let locals: Vec<LocalType> = offer.targets.iter().map(|t| t.local).collect();
        assert_eq!(locals, vec![LocalType::Html, LocalType::Bitmap]);
    }
}
