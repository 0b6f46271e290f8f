use clap::ValueEnum;
use rule_trace_engine::matchers::{
    action, any, any_of, ch, char_range, eoi, first_of, labelled, one_or_more, optional, proxy,
    sequence, string, test_not, zero_or_more,
};
use rule_trace_engine::Rule;

/// Built-in demo grammars
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Grammar {
    /// Integer arithmetic with + - * / and parentheses
    Arith,
    /// Comma separated records with quoted fields
    Csv,
    /// Newline separated lines, counted by an action
    Lines,
}

/// A built grammar. `keep` holds rules that are only reachable through
/// proxies and must stay alive for the run.
pub struct BuiltGrammar {
    pub root: Rule,
    #[allow(dead_code)]
    keep: Vec<Rule>,
}

impl Grammar {
    pub fn build(self) -> BuiltGrammar {
        match self {
            Self::Arith => arith(),
            Self::Csv => BuiltGrammar {
                root: csv(),
                keep: Vec::new(),
            },
            Self::Lines => BuiltGrammar {
                root: lines(),
                keep: Vec::new(),
            },
        }
    }
}

fn arith() -> BuiltGrammar {
    let spacing = labelled("Spacing", zero_or_more(any_of(" \t")));
    let token = |c: char| labelled(format!("'{c}'"), sequence([ch(c), spacing.clone()]));

    let expr = proxy("Expr");
    let expr_rule: Rule = expr.clone();

    let number = labelled(
        "Number",
        sequence([one_or_more(char_range('0', '9')), spacing.clone()]),
    );
    let parens = labelled("Parens", sequence([token('('), expr_rule.clone(), token(')')]));
    let factor = labelled("Factor", first_of([number, parens]));
    let term = labelled(
        "Term",
        sequence([
            factor.clone(),
            zero_or_more(sequence([first_of([token('*'), token('/')]), factor])),
        ]),
    );
    let sum = labelled(
        "Sum",
        sequence([
            term.clone(),
            zero_or_more(sequence([first_of([token('+'), token('-')]), term])),
        ]),
    );
    expr.bind(&sum);

    let root = labelled(
        "Arith",
        sequence([spacing, expr_rule, optional(ch('\n')), eoi()]),
    );
    BuiltGrammar {
        root,
        keep: vec![sum],
    }
}

fn csv() -> Rule {
    let quote = ch('"');
    let quoted = labelled(
        "Quoted",
        sequence([
            quote.clone(),
            zero_or_more(first_of([string("\"\""), sequence([test_not(quote.clone()), any()])])),
            quote,
        ]),
    );
    let bare = labelled(
        "Bare",
        zero_or_more(sequence([test_not(any_of(",\"\r\n")), any()])),
    );
    let field = labelled("Field", first_of([quoted, bare]));
    let record = labelled(
        "Record",
        sequence([field.clone(), zero_or_more(sequence([ch(','), field]))]),
    );
    let newline = labelled("Newline", sequence([optional(ch('\r')), ch('\n')]));
    labelled(
        "Csv",
        sequence([
            record.clone(),
            zero_or_more(sequence([newline.clone(), record])),
            optional(newline),
            eoi(),
        ]),
    )
}

fn lines() -> Rule {
    let text = labelled("Text", zero_or_more(sequence([test_not(ch('\n')), any()])));
    let count = action("CountLine", |cx| {
        log::trace!("line ends at {}", cx.current_index());
        Ok(true)
    });
    let line = labelled("Line", sequence([text.clone(), ch('\n'), count]));
    labelled("Lines", sequence([zero_or_more(line), text, eoi()]))
}
