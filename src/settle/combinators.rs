use super::{total_len, SettleContext, Settled, Settler};

/// Priority combinator: the first settler that yields anything wins.
pub struct Any {
    settlers: Vec<Box<dyn Settler>>,
}

#[must_use]
pub fn any(settlers: impl IntoIterator<Item = Box<dyn Settler>>) -> Any {
    Any {
        settlers: settlers.into_iter().collect(),
    }
}

impl Settler for Any {
    fn settle(&mut self, pending: &str, ctx: SettleContext) -> Vec<Settled> {
        for settler in &mut self.settlers {
            let settled = settler.settle(pending, ctx);
            if !settled.is_empty() {
                return settled;
            }
        }
        Vec::new()
    }
}

/// Conjunction combinator: yields only when every settler yields.
///
/// The yield covering the fewest bytes is returned; on a tie the earlier settler
/// wins. The tie-break is kept for compatibility and carries no deeper meaning.
///
/// Stateful settlers that lose are rolled back through [`Settler::fork`] and then
/// replayed over the winning text only, so their state tracks what was consumed.
pub struct All {
    settlers: Vec<Box<dyn Settler>>,
}

#[must_use]
pub fn all(settlers: impl IntoIterator<Item = Box<dyn Settler>>) -> All {
    All {
        settlers: settlers.into_iter().collect(),
    }
}

impl All {
    fn rewind(
        &mut self,
        forks: Vec<Option<Box<dyn Settler>>>,
        winner: Option<(usize, &str)>,
        ctx: SettleContext,
    ) {
        for (index, fork) in forks.into_iter().enumerate() {
            let Some(fork) = fork else { continue };
            match winner {
                Some((winner, _)) if winner == index => {}
                Some((_, consumed)) => {
                    self.settlers[index] = fork;
                    self.settlers[index].settle(consumed, ctx);
                }
                None => self.settlers[index] = fork,
            }
        }
    }
}

impl Settler for All {
    fn settle(&mut self, pending: &str, ctx: SettleContext) -> Vec<Settled> {
        if self.settlers.is_empty() {
            return Vec::new();
        }

        let forks: Vec<_> = self.settlers.iter().map(|settler| settler.fork()).collect();
        let mut best: Option<(usize, usize, Vec<Settled>)> = None;
        for (index, settler) in self.settlers.iter_mut().enumerate() {
            let settled = settler.settle(pending, ctx);
            if settled.is_empty() {
                best = None;
                break;
            }

            let len = total_len(&settled);
            match &best {
                Some((_, best_len, _)) if *best_len <= len => {}
                _ => best = Some((index, len, settled)),
            }
        }

        match best {
            Some((winner, _, settled)) => {
                let consumed: String =
                    settled.iter().map(|chunk| chunk.content.as_str()).collect();
                self.rewind(forks, Some((winner, &consumed)), ctx);
                settled
            }
            None => {
                self.rewind(forks, None, ctx);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::settle::{code_fence, line, max_size, paragraph, sentence, timeout, SettlerExt};

    fn contents(settled: Vec<Settled>) -> Vec<String> {
        settled.into_iter().map(|chunk| chunk.content).collect()
    }

    #[test]
    fn any_returns_first_listed_settler_that_yields() {
        let mut line_first = any([line().boxed(), paragraph().boxed()]);
        assert_eq!(
            contents(line_first.settle("has\n\nboth", SettleContext::default())),
            vec!["has\n", "\n"]
        );

        let mut paragraph_first = any([paragraph().boxed(), line().boxed()]);
        assert_eq!(
            contents(paragraph_first.settle("has\n\nboth", SettleContext::default())),
            vec!["has\n\n"]
        );
    }

    #[test]
    fn any_falls_through_to_later_settlers() {
        let mut settler = any([paragraph().boxed(), sentence().boxed()]);
        assert_eq!(
            contents(settler.settle("One. Two", SettleContext::default())),
            vec!["One. "]
        );
    }

    #[test]
    fn all_requires_every_settler_and_picks_smallest_yield() {
        let mut settler = all([timeout(100).boxed(), paragraph().boxed()]);

        assert!(settler
            .settle("para\n\nmore", SettleContext::elapsed(Duration::from_millis(50)))
            .is_empty());
        assert_eq!(
            contents(settler.settle(
                "para\n\nmore",
                SettleContext::elapsed(Duration::from_millis(150))
            )),
            vec!["para\n\n"]
        );
    }

    #[test]
    fn all_tie_goes_to_first_listed() {
        let mut plain_first = all([line().boxed(), code_fence().boxed()]);
        let settled = plain_first.settle("ab\n", SettleContext::default());
        assert_eq!(settled.len(), 1);
        assert!(settled[0].meta.is_none());

        let mut fenced_first = all([code_fence().boxed(), line().boxed()]);
        let settled = fenced_first.settle("ab\n", SettleContext::default());
        assert_eq!(settled.len(), 1);
        assert!(settled[0].meta.is_some());
    }

    #[test]
    fn all_prefers_shorter_yield_regardless_of_order() {
        let mut settler = all([max_size(0).boxed(), line().boxed()]);
        assert_eq!(
            contents(settler.settle("first\nsecond", SettleContext::default())),
            vec!["first\n"]
        );
    }

    #[test]
    fn all_rolls_back_fence_state_of_a_losing_settler() {
        let mut settler = all([code_fence().boxed(), paragraph().boxed()]);

        assert_eq!(
            contents(settler.settle("```\nx\n\n```\n", SettleContext::default())),
            vec!["```\nx\n\n"]
        );

        let settled = settler.settle("```\n\n", SettleContext::default());
        assert_eq!(settled[0].content, "```\n");
        let meta = settled[0].meta.as_ref().unwrap();
        assert!(meta.fence_end);
        assert!(!meta.fence_start);
    }

    #[test]
    fn all_keeps_fence_state_when_a_later_settler_declines() {
        let mut settler = all([code_fence().boxed(), paragraph().boxed()]);
        assert!(settler.settle("```\n", SettleContext::default()).is_empty());

        let settled = settler.settle("```\n\n", SettleContext::default());
        assert!(settled[0].meta.as_ref().unwrap().fence_start);
    }

    #[test]
    fn empty_combinators_never_yield() {
        assert!(any(Vec::new())
            .settle("text\n", SettleContext::default())
            .is_empty());
        assert!(all(Vec::new())
            .settle("text\n", SettleContext::default())
            .is_empty());
    }
}
