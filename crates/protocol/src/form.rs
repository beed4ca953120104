//! `jabber:x:data` forms as they appear inside disco#info replies.

use yts_domain::{Error, Result};

use crate::element::Element;
use crate::ns;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub var: String,
    /// The `type` attribute (`hidden`, `text-single`, `text-multi`, …)
    /// when present.
    pub field_type: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataForm {
    /// First value of the `FORM_TYPE` field, when the form has one.
    pub form_type: Option<String>,
    pub fields: Vec<FormField>,
}

impl DataForm {
    /// Read a form out of an `<x xmlns="jabber:x:data">` element.
    pub fn from_element(el: &Element) -> Result<Self> {
        if el.name() != "x" || el.ns() != ns::DATA_FORMS {
            return Err(Error::Protocol(format!(
                "not a data form: <{} xmlns={:?}>",
                el.name(),
                el.ns()
            )));
        }
        let mut fields = Vec::new();
        for field_el in el.child_elements().filter(|c| c.name() == "field") {
            let var = match field_el.get_attr("var") {
                Some(v) => v.to_owned(),
                // var-less fields carry nothing we can address
                None => continue,
            };
            let values = field_el
                .child_elements()
                .filter(|c| c.name() == "value")
                .map(|c| c.text_content())
                .collect();
            fields.push(FormField {
                var,
                field_type: field_el.get_attr("type").map(str::to_owned),
                values,
            });
        }
        let form_type = fields
            .iter()
            .find(|f| f.var == "FORM_TYPE")
            .and_then(|f| f.values.first())
            .cloned();
        Ok(Self { form_type, fields })
    }

    /// Find a field by var.
    pub fn field(&self, var: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.var == var)
    }

    /// First value of a field, when the field exists and has one.
    pub fn first_value(&self, var: &str) -> Option<&str> {
        self.field(var)
            .and_then(|f| f.values.first())
            .map(String::as_str)
    }

    /// All values of a field, empty when absent.
    pub fn values(&self, var: &str) -> &[String] {
        self.field(var).map(|f| f.values.as_slice()).unwrap_or(&[])
    }

    /// Serialize back to an `<x type="result">` element.
    pub fn to_element(&self) -> Element {
        let mut x = Element::new("x", ns::DATA_FORMS).attr("type", "result");
        for field in &self.fields {
            let mut f = Element::new("field", ns::DATA_FORMS).attr("var", &field.var);
            if let Some(t) = &field.field_type {
                f.set_attr("type", t.clone());
            }
            for value in &field.values {
                f.push_child(Element::new("value", ns::DATA_FORMS).text(value.clone()));
            }
            x.push_child(f);
        }
        x
    }
}

/// Builder used when publishing local services.
pub struct FormBuilder {
    form: DataForm,
}

impl FormBuilder {
    pub fn new(form_type: impl Into<String>) -> Self {
        let form_type = form_type.into();
        Self {
            form: DataForm {
                form_type: Some(form_type.clone()),
                fields: vec![FormField {
                    var: "FORM_TYPE".into(),
                    field_type: Some("hidden".into()),
                    values: vec![form_type],
                }],
            },
        }
    }

    pub fn field(mut self, var: impl Into<String>, field_type: Option<&str>, values: Vec<String>) -> Self {
        self.form.fields.push(FormField {
            var: var.into(),
            field_type: field_type.map(str::to_owned),
            values,
        });
        self
    }

    pub fn build(self) -> DataForm {
        self.form
    }
}
