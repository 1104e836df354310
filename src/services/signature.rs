//! services/signature.rs
//! Mete la firma de la cuenta remitente en el body de cada paso.

/// Token que el caller puede poner en el body para ubicar la firma.
pub const SIGNATURE_PLACEHOLDER: &str = "{{accountSignature}}";

/// Va entre el body y la firma cuando no hay placeholder.
pub const SIGNATURE_SEPARATOR: &str = "<br><br>";

/// Reemplaza el placeholder con `signature` si está; si no, la agrega al
/// final con un separador. Sin firma se quita el placeholder y el resto
/// del body queda igual.
pub fn apply_signature(body: &str, signature: Option<&str>) -> String {
    let signature = signature.map(str::trim).filter(|s| !s.is_empty());

    match signature {
        Some(sig) if body.contains(SIGNATURE_PLACEHOLDER) => {
            body.replace(SIGNATURE_PLACEHOLDER, sig)
        }
        Some(sig) => format!("{}{}{}", body, SIGNATURE_SEPARATOR, sig),
        None => body.replace(SIGNATURE_PLACEHOLDER, ""),
    }
}
