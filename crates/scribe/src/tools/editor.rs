use serde_json::json;

use crate::models::tool::Tool;

const INSERT_CONTENT_DESCRIPTION: &str = "Inserts HTML content at one of these positions:
- 'document': Replace the entire document with HTML content.
- 'documentStart': Insert HTML content at the start of the document.
- 'documentEnd': Insert HTML content at the end of the document.
- 'selection': Replace the editor selection with HTML content.
- 'selectionStart': Insert HTML content before the editor selection.
- 'selectionEnd': Insert HTML content after the editor selection.

IMPORTANT RULES
- Before you call a tool that edits the document like applyDiff and insertContent, make sure you read the document first and you understand it very well.
- Before calling insertContent with position selection/selectionStart/selectionEnd, read the editor selection first with the readSelection tool.
- ALWAYS use the applyDiff tool to make edits to the document instead of insertContent, except when you are absolutely sure that you need to insert content at these positions: document/documentStart/documentEnd/selection/selectionStart/selectionEnd.";

const APPLY_DIFF_DESCRIPTION: &str = r#"Apply a list of diffs to the HTML code of the current chunk. Each diff contains:
- "delete": replaced code. Must be an EXACT match.
- "insert": inserted code (an empty string if the diff is a deletion)
- "context": The 10 characters before the "delete" code, or an empty string if the diff is at the beginning of the document.

For example, if the HTML code is "<p>This is a paragraph</p><p>This is another paragraph</p>" and you want to replace the second "paragraph" with "<b>paragraph</b>", you would use:
- "delete": "paragraph"
- "insert": "<b>paragraph</b>"
- "context": "<p>This is another" <-- Contains the 10 characters before "paragraph"

If the diff starts at the beginning of the document:
- "delete": "<p>This"
- "insert": "<p>That"
- "context": "" <-- Empty string, because there is no text before

The "context" should be short (10 characters), but if the "delete" text is repeated so many times that a short "context" is not enough to uniquely identify the position, make "context" longer so that there is no ambiguity.

IMPORTANT: do not, under any circumstance, make the "context" include the "delete" text.

The diffs will be applied in sequence, one after the other, from top to bottom."#;

fn no_arguments() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {},
        "required": [],
        "additionalProperties": false
    })
}

fn document_name_argument() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "documentName": {"type": "string"}
        },
        "required": ["documentName"],
        "additionalProperties": false
    })
}

/// Tools the editor executes against the open document
pub fn editor_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "insertContent",
            INSERT_CONTENT_DESCRIPTION,
            json!({
                "type": "object",
                "properties": {
                    "html": {
                        "type": "string",
                        "description": "The HTML content to insert"
                    },
                    "position": {
                        "type": "string",
                        "enum": [
                            "selection",
                            "selectionStart",
                            "selectionEnd",
                            "document",
                            "documentStart",
                            "documentEnd"
                        ],
                        "description": "Position where to insert the content"
                    }
                },
                "required": ["html", "position"],
                "additionalProperties": false
            }),
        ),
        Tool::new(
            "applyDiff",
            APPLY_DIFF_DESCRIPTION,
            json!({
                "type": "object",
                "properties": {
                    "diffs": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "context": {
                                    "type": "string",
                                    "description": "The 10 characters before the delete text"
                                },
                                "delete": {
                                    "type": "string",
                                    "description": "The text to be replaced (exact match required)"
                                },
                                "insert": {
                                    "type": "string",
                                    "description": "The new text to insert"
                                }
                            },
                            "required": ["context", "delete", "insert"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["diffs"],
                "additionalProperties": false
            }),
        ),
        Tool::new(
            "readFirstChunk",
            "You read the current document in chunks, not all at once. When you read a chunk, you'll be informed of the total number of chunks in the current document, the index of the current chunk (zero-based) and the content of the chunk (between triple quotes). The readFirstChunk tool reads the first chunk of the document.",
            no_arguments(),
        ),
        Tool::new(
            "readNextChunk",
            "Read the next chunk of the document.",
            no_arguments(),
        ),
        Tool::new(
            "readPreviousChunk",
            "Read the previous chunk of the document.",
            no_arguments(),
        ),
        Tool::new(
            "readSelection",
            "Read the editor selection. Get the selected content (in HTML format) and the index of the chunk where the editor selection starts.",
            no_arguments(),
        ),
    ]
}

/// Tools for switching between several open documents
pub fn multi_document_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "createDocument",
            "Create a new document",
            document_name_argument(),
        ),
        Tool::new(
            "listDocuments",
            "See a list of all the documents you have access to, and see which is the active document",
            no_arguments(),
        ),
        Tool::new(
            "setActiveDocument",
            "Switch to a specific document, so that it becomes the active document",
            document_name_argument(),
        ),
        Tool::new("deleteDocument", "Delete a document", document_name_argument()),
    ]
}

/// Tools the editor executes against the comment threads of the open document
pub fn comment_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "getThreads",
            "Read the comment threads of the document. Each thread has an id, the text it is attached to, whether it is resolved, and its comments.",
            no_arguments(),
        ),
        Tool::new(
            "editThreads",
            "Create, reply to, update, resolve or delete comment threads. The operations are applied in order. Read the threads and the document before editing them.",
            json!({
                "type": "object",
                "properties": {
                    "operations": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "type": {
                                    "type": "string",
                                    "enum": [
                                        "createThread",
                                        "addComment",
                                        "updateComment",
                                        "resolveThread",
                                        "deleteThread"
                                    ]
                                },
                                "threadId": {
                                    "type": "string",
                                    "description": "The thread to change, unused by createThread"
                                },
                                "commentId": {
                                    "type": "string",
                                    "description": "The comment to update"
                                },
                                "quote": {
                                    "type": "string",
                                    "description": "Exact document text a new thread is attached to"
                                },
                                "content": {
                                    "type": "string",
                                    "description": "Text of the comment"
                                }
                            },
                            "required": ["type"]
                        }
                    }
                },
                "required": ["operations"],
                "additionalProperties": false
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::utils::tools_to_openai_spec;

    #[test]
    fn test_editor_and_multi_document_tools_are_valid_together() {
        let mut tools = editor_tools();
        tools.extend(multi_document_tools());

        let spec = tools_to_openai_spec(&tools).unwrap();
        assert_eq!(spec.len(), 10);
        assert_eq!(
            spec[1]["function"]["parameters"]["required"],
            json!(["diffs"])
        );
    }

    #[test]
    fn test_comment_tools_are_valid() {
        let spec = tools_to_openai_spec(&comment_tools()).unwrap();
        assert_eq!(spec.len(), 2);
        assert_eq!(spec[0]["function"]["name"], "getThreads");
        assert_eq!(
            spec[1]["function"]["parameters"]["required"],
            json!(["operations"])
        );
    }
}
